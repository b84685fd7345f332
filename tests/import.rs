mod common;

use glam::{Quat, Vec3};
use studiomodel::{
    archive::MemorySource,
    coord::CoordinateTransform,
    error::{CrossReferenceKind, FileKind, ImportError},
    loader::{import, load_bundle, load_model, BundleLoadError, ImportOptions, ModelFiles},
    mesh::Skin,
};

use common::{Fixture, FixtureBone};

fn source(fixture: &Fixture) -> MemorySource {
    MemorySource::new()
        .with("models/fixture.mdl", fixture.mdl())
        .with("models/fixture.dx90.vtx", fixture.vtx())
        .with("models/fixture.vvd", fixture.vvd())
        .with("models/fixture.phy", fixture.phy())
}

fn files(fixture: &Fixture) -> ModelFiles {
    ModelFiles {
        model: fixture.mdl(),
        animation_blocks: None,
        hardware_mesh: Some(fixture.vtx()),
        vertex_data: Some(fixture.vvd()),
        collision: Some(fixture.phy()),
    }
}

#[test]
fn full_import_decodes_every_part() {
    let fixture = Fixture::default();
    let model = load_model(&mut source(&fixture), "models/fixture.mdl", &ImportOptions::default())
        .unwrap();

    assert!(model.rejected.is_empty(), "{:?}", model.rejected);
    assert_eq!(model.name, "fixture/fixture.mdl");
    assert_eq!(model.version, 48);
    assert_eq!(model.checksum, common::CHECKSUM);
    assert_eq!(model.surface_prop, "metal");

    assert_eq!(model.skeleton.len(), 2);
    assert!(!model.skeleton.has_synthetic_root());
    assert_eq!(model.skeleton.find("arm"), Some(1));

    let mesh = model.mesh.as_ref().unwrap();
    assert_eq!(mesh.lods.len(), 1);
    let names: Vec<&str> = mesh.materials.iter().map(|slot| slot.name.as_str()).collect();
    assert_eq!(names, ["metal", "glass"]);
    assert_eq!(mesh.materials[0].search_paths, ["models/fixture/"]);

    let sections = &mesh.lods[0].sections;
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].name, "body_0_metal");
    assert_eq!(sections[1].name, "head_0_glass");
    assert_eq!(sections[1].material, 1);
    assert_eq!(sections[0].indices, [0, 1, 2]);
    // The second body part starts after the first one's vertices.
    assert_eq!(sections[1].attributes.position[2], [2.0, 1.0, 0.0]);
    assert_eq!(sections[0].attributes.weights[0][0], 1.0);

    assert_eq!(mesh.bodygroups.len(), 2);
    assert_eq!(mesh.bodygroups[1].name, "head");
    assert_eq!(mesh.bodygroups[1].choices[0].name, "head_model");
    assert_eq!(mesh.bodygroups[1].choices[0].sections, [1]);
    assert_eq!(
        mesh.skins,
        [Skin {
            name: String::from("skin1"),
            overrides: vec![(0, 1)],
        }]
    );

    assert_eq!(model.attachments.len(), 1);
    assert_eq!(model.attachments[0].name, "muzzle");
    assert_eq!(model.attachments[0].bone, 1);
    assert!(model.attachments[0]
        .local
        .translation
        .abs_diff_eq(Vec3::X, 1e-5));

    let base = model
        .key_values
        .as_ref()
        .and_then(|key_values| key_values.path("mdlkeyvalue.prop_data.base"))
        .and_then(|value| value.as_str());
    assert_eq!(base, Some("Wooden.Small"));
}

#[test]
fn clip_tracks_follow_the_runs() {
    let fixture = Fixture::default();
    let model = import(&files(&fixture), &ImportOptions::default()).unwrap();

    assert_eq!(model.clips.len(), 1);
    let clip = &model.clips[0];
    assert_eq!(clip.name, "idle");
    assert_eq!(clip.frame_count, 2);
    assert!(clip.looping);
    assert!(!clip.delta);
    assert_eq!(clip.tracks.len(), 2);

    let arm = &clip.tracks[1];
    assert!(arm.translations[0].abs_diff_eq(Vec3::new(0.0, 0.0, 10.0), 1e-4));
    assert!(arm.translations[1].abs_diff_eq(Vec3::new(0.0, 0.0, 20.0), 1e-4));

    // Only the root picks up the yaw correction.
    let yaw = Quat::from_rotation_z((-90.0f32).to_radians());
    assert!(clip.tracks[0].rotations[0].abs_diff_eq(yaw, 1e-4));
    assert!(arm.rotations[1].abs_diff_eq(Quat::IDENTITY, 1e-4));

    assert_eq!(model.sequences.len(), 1);
    assert_eq!(model.sequences[0].name, "idle");
    assert_eq!(model.sequences[0].activity, "ACT_IDLE");
    assert!(model.sequences[0].looping);
    assert_eq!(model.sequences[0].clips, [0]);
}

#[test]
fn root_yaw_can_be_turned_off() {
    let fixture = Fixture::default();
    let options = ImportOptions {
        root_yaw_correction_degrees: None,
        ..Default::default()
    };
    let model = import(&files(&fixture), &options).unwrap();
    assert!(model.clips[0].tracks[0].rotations[0].abs_diff_eq(Quat::IDENTITY, 1e-5));
}

#[test]
fn collision_solids_and_constraints() {
    let fixture = Fixture::default();
    let model = import(&files(&fixture), &ImportOptions::default()).unwrap();

    assert_eq!(model.solids.len(), 2);
    let root = &model.solids[0];
    assert_eq!(root.name, "root");
    assert_eq!(root.surface_prop.as_deref(), Some("metal"));
    assert_eq!(root.mass, Some(5.0));
    assert_eq!(root.hulls.len(), 1);
    assert_eq!(root.hulls[0].bone, Some(0));
    assert_eq!(root.hulls[0].vertices.len(), 4);
    assert_eq!(root.hulls[0].faces.len(), 4);
    assert_eq!(model.solids[1].name, "arm");
    assert_eq!(model.solids[1].hulls[0].bone, Some(1));

    assert_eq!(model.constraints.len(), 1);
    let constraint = &model.constraints[0];
    assert_eq!((constraint.parent, constraint.child), (0, 1));
    assert_eq!(constraint.limits[0].min, -45.0);
    assert_eq!(constraint.limits[0].max, 45.0);
    assert!(constraint.limits[1].is_locked());
}

#[test]
fn mirrored_convention_reverses_winding() {
    let fixture = Fixture::default();
    let options = ImportOptions {
        coordinate_transform: CoordinateTransform::source_to_z_up_left_handed(),
        ..Default::default()
    };
    let model = import(&files(&fixture), &options).unwrap();
    let mesh = model.mesh.unwrap();
    assert_eq!(mesh.lods[0].sections[0].indices, [2, 1, 0]);
    assert!(model.rejected.is_empty(), "{:?}", model.rejected);
}

#[test]
fn checksum_mismatch_aborts_import() {
    let fixture = Fixture {
        sibling_checksum: common::CHECKSUM + 1,
        ..Default::default()
    };
    match import(&files(&fixture), &ImportOptions::default()) {
        Err(ImportError::Structural(error)) => {
            assert_eq!(error.file, FileKind::HardwareMesh);
            assert_eq!(error.field, "checksum");
        }
        other => panic!("Expected a checksum error, got {:?}", other.map(|model| model.name)),
    }
}

#[test]
fn unsupported_version_aborts_import() {
    let fixture = Fixture {
        version: 37,
        ..Default::default()
    };
    match import(&files(&fixture), &ImportOptions::default()) {
        Err(ImportError::Structural(error)) => {
            assert_eq!(error.file, FileKind::Model);
            assert_eq!(error.field, "version");
        }
        other => panic!("Expected a version error, got {:?}", other.map(|model| model.name)),
    }
}

#[test]
fn body_part_count_mismatch_costs_only_the_mesh() {
    let fixture = Fixture {
        vtx_body_parts: 1,
        ..Default::default()
    };
    let model = import(&files(&fixture), &ImportOptions::default()).unwrap();
    assert!(model.mesh.is_none());
    assert_eq!(model.clips.len(), 1);
    assert_eq!(model.solids.len(), 2);
    assert!(matches!(
        model.rejected.as_slice(),
        [ImportError::CrossReference(error)] if error.kind == CrossReferenceKind::BodyPartCount
    ));
}

#[test]
fn missing_vertex_data_skips_mesh() {
    let fixture = Fixture::default();
    let mut source = MemorySource::new()
        .with("models/fixture.mdl", fixture.mdl())
        .with("models/fixture.vtx", fixture.vtx());
    let model = load_model(&mut source, "models/fixture.mdl", &ImportOptions::default()).unwrap();
    assert!(model.mesh.is_none());
    assert!(model.solids.is_empty());
    assert!(model.rejected.is_empty());
    assert_eq!(model.clips.len(), 1);
}

#[test]
fn rootless_bones_get_a_synthetic_root() {
    let fixture = Fixture {
        bones: vec![
            FixtureBone::new("pelvis", -1, [0.0, 0.0, 0.0]),
            FixtureBone::new("prop", -1, [0.0, 0.0, 10.0]),
        ],
        ..Default::default()
    };
    let model = import(&files(&fixture), &ImportOptions::default()).unwrap();
    assert!(model.rejected.is_empty(), "{:?}", model.rejected);
    assert!(model.skeleton.has_synthetic_root());
    assert_eq!(model.skeleton.len(), 3);
    assert_eq!(model.skeleton.find("prop"), Some(2));

    let mesh = model.mesh.unwrap();
    assert_eq!(mesh.lods[0].sections[0].attributes.joints[0][0], 1);
    assert_eq!(model.attachments[0].bone, 2);
    assert_eq!(model.clips[0].tracks.len(), 3);
    assert_eq!(model.solids[1].hulls[0].bone, Some(2));
}

#[test]
fn bundle_uses_the_configured_name() {
    let fixture = Fixture::default();
    let mut source = MemorySource::new()
        .with("model.mdl", fixture.mdl())
        .with("model.vtx", fixture.vtx())
        .with("model.vvd", fixture.vvd());
    let model = load_bundle(&mut source, &ImportOptions::default()).unwrap();
    assert!(model.mesh.is_some());

    let options = ImportOptions {
        bundle_model_name: String::from("other"),
        ..Default::default()
    };
    assert!(matches!(
        load_bundle(&mut source, &options),
        Err(BundleLoadError::ModelNotFound(name)) if name == "other.mdl"
    ));
}

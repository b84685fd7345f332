use std::fmt::{Display, Formatter};

use crate::{
    archive::FileSource,
    coord::CoordinateTransform,
    error::{CrossReferenceError, CrossReferenceKind, FileKind, ImportError, Location},
    keyvalues::KeyValue,
    mesh::MeshAsset,
    model::{Attachment, ImportedModel, IncludedModel},
    skeleton::{Bone, Skeleton},
};

use self::{
    anim::ClipDecoder,
    format::{mdl::MdlFile, phy::PhyFile, vtx::VtxFile, vvd::VvdFile},
    mesh::{MeshAssembler, MeshInput},
    physics::CollisionDecoder,
    validate::HeaderCheck,
};

pub mod anim;
pub mod format;
mod mesh;
mod physics;
pub mod validate;

/// Hardware mesh variants, most preferred first.
const HARDWARE_MESH_EXTENSIONS: [&str; 4] = ["vtx", "dx90.vtx", "dx80.vtx", "sw.vtx"];

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// From the model descriptor's convention to the caller's.
    pub coordinate_transform: CoordinateTransform,
    /// From collision vertex space to the model descriptor's convention.
    pub collision_transform: CoordinateTransform,
    /// Yaw about the up axis added to root bones of non-delta clips.
    pub root_yaw_correction_degrees: Option<f32>,
    pub import_mesh: bool,
    pub import_animations: bool,
    pub import_collision: bool,
    pub max_lods: Option<usize>,
    pub bundle_model_name: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            coordinate_transform: CoordinateTransform::identity(),
            collision_transform: CoordinateTransform::ivp_to_source(),
            root_yaw_correction_degrees: Some(-90.0),
            import_mesh: true,
            import_animations: true,
            import_collision: true,
            max_lods: None,
            bundle_model_name: String::from("model"),
        }
    }
}

impl ImportOptions {
    pub(crate) fn bundle_model_filename(&self, extension: &str) -> String {
        format!("{}.{}", self.bundle_model_name, extension)
    }
}

/// Raw contents of a model and whichever sibling files were found.
#[derive(Debug, Clone, Default)]
pub struct ModelFiles {
    pub model: Vec<u8>,
    pub animation_blocks: Option<Vec<u8>>,
    pub hardware_mesh: Option<Vec<u8>>,
    pub vertex_data: Option<Vec<u8>>,
    pub collision: Option<Vec<u8>>,
}

#[derive(Debug)]
pub enum BundleLoadError<E> {
    Io(E),
    ModelNotFound(String),
    Import(ImportError),
}

impl<E: Display> Display for BundleLoadError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleLoadError::Io(io) => Display::fmt(io, f),
            BundleLoadError::ModelNotFound(file_name) => {
                write!(f, "File {} not found", file_name)
            }
            BundleLoadError::Import(import) => Display::fmt(import, f),
        }
    }
}

impl<E: std::error::Error> std::error::Error for BundleLoadError<E> {}

impl<E> From<ImportError> for BundleLoadError<E> {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

fn read_first<S: FileSource>(source: &mut S, candidates: &[String]) -> Result<Option<Vec<u8>>, S::Error> {
    for path in candidates {
        if let Some(data) = source.read(path)? {
            log::debug!("Found {}", path);
            return Ok(Some(data));
        }
    }
    Ok(None)
}

impl ModelFiles {
    /// Reads `model_path` and looks for its siblings next to it.
    pub fn load<S: FileSource>(
        source: &mut S,
        model_path: &str,
    ) -> Result<Self, BundleLoadError<S::Error>> {
        let model = source
            .read(model_path)
            .map_err(BundleLoadError::Io)?
            .ok_or_else(|| BundleLoadError::ModelNotFound(model_path.to_string()))?;

        let stem = match model_path.rsplit_once('.') {
            Some((stem, extension)) if extension.eq_ignore_ascii_case("mdl") => stem,
            _ => model_path,
        };
        let directory = match model_path.rfind(['/', '\\']) {
            Some(end) => &model_path[..=end],
            None => "",
        };
        let sibling = |extension: &str| format!("{}.{}", stem, extension);

        let hardware_mesh_paths: Vec<String> =
            HARDWARE_MESH_EXTENSIONS.iter().map(|extension| sibling(extension)).collect();
        let hardware_mesh = read_first(source, &hardware_mesh_paths).map_err(BundleLoadError::Io)?;
        let vertex_data = source.read(&sibling("vvd")).map_err(BundleLoadError::Io)?;
        let collision = source.read(&sibling("phy")).map_err(BundleLoadError::Io)?;

        let mut animation_paths = Vec::new();
        if let Ok(Some(name)) = format::mdl::anim_block_name(&model) {
            let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name.as_str());
            animation_paths.push(format!("{}{}", directory, file_name));
        }
        animation_paths.push(sibling("ani"));
        let animation_blocks = read_first(source, &animation_paths).map_err(BundleLoadError::Io)?;

        Ok(Self {
            model,
            animation_blocks,
            hardware_mesh,
            vertex_data,
            collision,
        })
    }
}

/// Loads a model and its siblings from `source` and imports them.
pub fn load_model<S: FileSource>(
    source: &mut S,
    model_path: &str,
    options: &ImportOptions,
) -> Result<ImportedModel, BundleLoadError<S::Error>> {
    let files = ModelFiles::load(source, model_path)?;
    Ok(import(&files, options)?)
}

/// Loads the model named by [`ImportOptions::bundle_model_name`].
pub fn load_bundle<S: FileSource>(
    source: &mut S,
    options: &ImportOptions,
) -> Result<ImportedModel, BundleLoadError<S::Error>> {
    let file_name = options.bundle_model_filename("mdl");
    load_model(source, &file_name, options)
}

fn source_skeleton(model: &MdlFile) -> Result<Skeleton, ImportError> {
    let bones = model
        .bones
        .iter()
        .map(|bone| Bone {
            name: bone.name.clone(),
            parent: usize::try_from(bone.parent).ok(),
            local: bone.local(),
        })
        .collect();
    Ok(Skeleton::build(bones)?)
}

/// Every header is checked before anything is parsed, so a structural error never leaves a
/// partial import behind.
fn validate_headers(files: &ModelFiles) -> Result<i32, ImportError> {
    HeaderCheck::model().validate(&files.model)?;
    let checksum = i32::from_le_bytes([files.model[8], files.model[9], files.model[10], files.model[11]]);
    if let Some(data) = &files.animation_blocks {
        HeaderCheck::animation_blocks().validate(data)?;
    }
    if let Some(data) = &files.hardware_mesh {
        HeaderCheck::hardware_mesh(checksum).validate(data)?;
    }
    if let Some(data) = &files.vertex_data {
        HeaderCheck::vertex_data(checksum).validate(data)?;
    }
    if let Some(data) = &files.collision {
        HeaderCheck::collision(checksum).validate(data)?;
    }
    Ok(checksum)
}

/// Decodes a model and its siblings.
///
/// Structural errors and an unreadable model descriptor fail the import. Anything else only
/// costs the part it occurs in and ends up in [`ImportedModel::rejected`].
pub fn import(files: &ModelFiles, options: &ImportOptions) -> Result<ImportedModel, ImportError> {
    let checksum = validate_headers(files)?;
    let model = MdlFile::parse(&files.model).map_err(ImportError::format(FileKind::Model))?;
    log::info!(
        "Importing {:?} (version {}, {} bones, {} body parts, {} clips)",
        model.header.name,
        model.header.version,
        model.bones.len(),
        model.body_parts.len(),
        model.animations.len()
    );

    let coord = &options.coordinate_transform;
    let source = source_skeleton(&model)?;
    let skeleton = source.transformed(coord);
    let mut rejected = Vec::new();

    let mesh = if options.import_mesh {
        import_mesh(files, &model, &source, options, &mut rejected)
    } else {
        None
    };

    let (clips, sequences) = if options.import_animations {
        ClipDecoder::new(
            &model,
            &files.model,
            files.animation_blocks.as_deref(),
            &source,
            coord,
            options.root_yaw_correction_degrees,
        )
        .decode_all(&mut rejected)
    } else {
        (Vec::new(), Vec::new())
    };

    let (solids, constraints) = match (&files.collision, options.import_collision) {
        (Some(data), true) => match PhyFile::parse(data) {
            Ok(phy) => CollisionDecoder::new(&source, &skeleton, &options.collision_transform, coord)
                .decode(&phy, &mut rejected),
            Err(error) => {
                log::error!("Skipping collision: {}", error);
                rejected.push(ImportError::Format {
                    file: FileKind::Collision,
                    error,
                });
                (Vec::new(), Vec::new())
            }
        },
        _ => (Vec::new(), Vec::new()),
    };

    let attachments = import_attachments(&model, &source, &skeleton, coord, &mut rejected);

    let key_values = model.key_values.as_deref().and_then(|text| match KeyValue::parse(text) {
        Ok(key_values) => Some(key_values),
        Err(error) => {
            log::error!("Skipping embedded key values: {}", error);
            rejected.push(ImportError::KeyValues {
                file: FileKind::Model,
                error,
            });
            None
        }
    });

    Ok(ImportedModel {
        name: model.header.name.clone(),
        version: model.header.version,
        checksum,
        skeleton,
        mesh,
        clips,
        sequences,
        solids,
        constraints,
        attachments,
        included_models: model
            .include_models
            .iter()
            .map(|include| IncludedModel {
                label: include.label.clone(),
                file_name: include.file_name.clone(),
            })
            .collect(),
        surface_prop: model.surface_prop.clone(),
        key_values,
        rejected,
    })
}

fn import_mesh(
    files: &ModelFiles,
    model: &MdlFile,
    source: &Skeleton,
    options: &ImportOptions,
    rejected: &mut Vec<ImportError>,
) -> Option<MeshAsset> {
    let (Some(vtx), Some(vvd)) = (&files.hardware_mesh, &files.vertex_data) else {
        log::warn!("Hardware mesh or vertex data file is missing, skipping mesh");
        return None;
    };
    let vtx = match VtxFile::parse(vtx) {
        Ok(vtx) => vtx,
        Err(error) => {
            log::error!("Skipping mesh: {}", error);
            rejected.push(ImportError::Format {
                file: FileKind::HardwareMesh,
                error,
            });
            return None;
        }
    };
    let vvd = match VvdFile::parse(vvd) {
        Ok(vvd) => vvd,
        Err(error) => {
            log::error!("Skipping mesh: {}", error);
            rejected.push(ImportError::Format {
                file: FileKind::VertexData,
                error,
            });
            return None;
        }
    };
    let input = MeshInput {
        body_parts: &model.body_parts,
        textures: &model.textures,
        texture_dirs: &model.texture_dirs,
        skin_families: &model.skin_families,
        bone_count: model.bones.len(),
        bone_offset: source.index_offset(),
    };
    match MeshAssembler::new(input, &vtx, &vvd, &options.coordinate_transform, options.max_lods)
        .assemble()
    {
        Ok((mesh, errors)) => {
            rejected.extend(errors.into_iter().map(ImportError::from));
            Some(mesh)
        }
        Err(error) => {
            log::error!("Skipping mesh: {}", error);
            rejected.push(error.into());
            None
        }
    }
}

/// Attachment offsets go through component space like everything else bound to a bone.
fn import_attachments(
    model: &MdlFile,
    source: &Skeleton,
    skeleton: &Skeleton,
    coord: &CoordinateTransform,
    rejected: &mut Vec<ImportError>,
) -> Vec<Attachment> {
    let source_components = source.component_transforms();
    let components = skeleton.component_transforms();
    let offset = source.index_offset();
    let mut attachments = Vec::with_capacity(model.attachments.len());
    for attachment in &model.attachments {
        let Some(bone) = usize::try_from(attachment.bone)
            .ok()
            .filter(|bone| *bone < model.bones.len())
            .map(|bone| bone + offset)
        else {
            let error = CrossReferenceError {
                file: FileKind::Model,
                location: Location::default(),
                kind: CrossReferenceKind::BoneIndex,
                expected: model.bones.len() as i64,
                actual: i64::from(attachment.bone),
            };
            log::error!("Skipping attachment {:?}: {}", attachment.name, error);
            rejected.push(error.into());
            continue;
        };
        let component = coord.transform(&attachment.local.then(&source_components[bone]));
        attachments.push(Attachment {
            name: attachment.name.clone(),
            bone,
            local: component.relative_to(&components[bone]),
        });
    }
    attachments
}

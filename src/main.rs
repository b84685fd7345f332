use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use log::error;
use studiomodel::{
    archive::DirectorySource,
    coord::CoordinateTransform,
    loader::{load_model, ImportOptions},
    model::ImportedModel,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Convention {
    /// Keep the model descriptor's Z-up right-handed space
    Source,
    /// Z-up left-handed
    ZUpLeftHanded,
    /// Y-up right-handed
    YUp,
}

impl Convention {
    fn transform(self) -> CoordinateTransform {
        match self {
            Convention::Source => CoordinateTransform::identity(),
            Convention::ZUpLeftHanded => CoordinateTransform::source_to_z_up_left_handed(),
            Convention::YUp => CoordinateTransform::source_to_y_up(),
        }
    }
}

#[derive(Parser)]
#[command(name = "studiomodel")]
#[command(about = "Decode a compiled studio model and print what it contains")]
#[command(version)]
struct Cli {
    /// Path to the .mdl file; sibling files are looked up next to it
    path: PathBuf,

    /// Skip keyframe clips
    #[arg(long)]
    no_animations: bool,

    /// Skip collision solids
    #[arg(long)]
    no_collision: bool,

    /// Assemble at most this many LODs
    #[arg(long, value_name = "N")]
    lods: Option<usize>,

    /// Coordinate convention of the output
    #[arg(long, value_enum, default_value = "source")]
    convention: Convention,

    /// Yaw added to root bones of clips, in degrees
    #[arg(long, allow_hyphen_values = true)]
    root_yaw: Option<f32>,
}

fn print_summary(model: &ImportedModel) {
    println!("{} (version {}, checksum {:#010x})", model.name, model.version, model.checksum);
    println!(
        "  bones: {}{}",
        model.skeleton.len(),
        if model.skeleton.has_synthetic_root() {
            " (synthetic root)"
        } else {
            ""
        }
    );
    match &model.mesh {
        Some(mesh) => {
            println!("  materials: {}", mesh.materials.len());
            for (index, lod) in mesh.lods.iter().enumerate() {
                let triangles: usize = lod.sections.iter().map(|section| section.triangle_count()).sum();
                println!(
                    "  LOD {} (switch {}): {} sections, {} triangles",
                    index,
                    lod.switch_point,
                    lod.sections.len(),
                    triangles
                );
            }
            for bodygroup in &mesh.bodygroups {
                println!("  bodygroup {:?}: {} choices", bodygroup.name, bodygroup.choices.len());
            }
            println!("  skins: {}", mesh.skins.len() + 1);
        }
        None => println!("  no mesh"),
    }
    println!("  clips: {}", model.clips.len());
    for clip in &model.clips {
        println!(
            "    {:?}: {} frames, {:.2}s{}{}",
            clip.name,
            clip.frame_count,
            clip.duration(),
            if clip.looping { ", looping" } else { "" },
            if clip.delta { ", delta" } else { "" }
        );
    }
    println!("  sequences: {}", model.sequences.len());
    println!(
        "  collision: {} solids, {} constraints",
        model.solids.len(),
        model.constraints.len()
    );
    println!("  attachments: {}", model.attachments.len());
    for include in &model.included_models {
        println!("  includes {:?}", include.file_name);
    }
    if !model.rejected.is_empty() {
        println!("  rejected parts: {}", model.rejected.len());
        for rejected in &model.rejected {
            println!("    {}", rejected);
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    #[cfg(feature = "panics-log")]
    log_panics::init();

    let cli = Cli::parse();
    let mut options = ImportOptions {
        coordinate_transform: cli.convention.transform(),
        import_animations: !cli.no_animations,
        import_collision: !cli.no_collision,
        max_lods: cli.lods,
        ..Default::default()
    };
    if let Some(yaw) = cli.root_yaw {
        options.root_yaw_correction_degrees = Some(yaw);
    }

    let directory = cli
        .path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    let Some(file_name) = cli.path.file_name().and_then(|name| name.to_str()) else {
        error!("Bad model path {}", cli.path.display());
        return ExitCode::FAILURE;
    };
    let mut source = DirectorySource::new(directory);
    match load_model(&mut source, file_name, &options) {
        Ok(model) => {
            print_summary(&model);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Failed to import {}: {}", cli.path.display(), err);
            ExitCode::FAILURE
        }
    }
}

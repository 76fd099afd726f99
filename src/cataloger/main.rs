// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("atalk-camera-cataloger requires the 'std' feature");

use atalk_camera_module::{
    cli::{handle_error, info_user, warn_user, warn_user_with_error},
    shared::{CameraCharacteristics, CameraError, StreamConfig, open_platform},
};
use asimov_module::SysexitsError::{self, *};
use clap::Parser;
use clientele::StandardOptions;
use dogma::Named as _;
use serde_json::json;
use std::error::Error as StdError;

#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    #[arg(
        value_name = "FORMAT",
        short = 'o',
        long = "output",
        value_enum,
        default_value = "text"
    )]
    output: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Jsonl,
}

pub fn main() -> Result<SysexitsError, Box<dyn StdError>> {
    asimov_module::dotenv().ok();
    let args = asimov_module::args_os()?;
    let options = Options::parse_from(args);

    if options.flags.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(EX_OK);
    }

    if options.flags.license {
        print!("{}", include_str!("../../UNLICENSE"));
        return Ok(EX_OK);
    }

    #[cfg(feature = "tracing")]
    asimov_module::init_tracing_subscriber(&options.flags).expect("failed to initialize logging");

    let exit_code = match run_cataloger(&options) {
        Ok(()) => EX_OK,
        Err(err) => handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_cataloger(options: &Options) -> Result<(), CameraError> {
    let manager = open_platform(&StreamConfig::default())?;
    info_user(
        &options.flags,
        &format!("enumerating cameras via {}", manager.name()),
    );

    let mut ids = manager.camera_ids()?;
    if ids.is_empty() {
        warn_user(&options.flags, "no cameras found");
        return Ok(());
    }
    ids.sort();

    for id in ids {
        let camera = match manager.characteristics(&id) {
            Ok(camera) => camera,
            Err(err) => {
                warn_user_with_error(&options.flags, &format!("skipping camera {id}"), &err);
                continue;
            },
        };
        match options.output {
            OutputFormat::Text => println!("{}", describe(&camera)),
            OutputFormat::Jsonl => {
                let sizes: Vec<String> = camera.output_sizes.iter().map(ToString::to_string).collect();
                println!(
                    "{}",
                    json!({
                        "id": camera.id,
                        "backend": manager.backend().to_string(),
                        "facing": camera.facing.to_string(),
                        "sensor_orientation": camera.sensor_orientation,
                        "sizes": sizes,
                    })
                );
            },
        }
    }

    Ok(())
}

fn describe(camera: &CameraCharacteristics) -> String {
    let sizes: Vec<String> = camera.output_sizes.iter().map(ToString::to_string).collect();
    format!(
        "{}: {} camera, sensor at {}°, sizes {}",
        camera.id,
        camera.facing,
        camera.sensor_orientation,
        sizes.join(" "),
    )
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `typedstore_core` linkage and storage bootstrap end to end.
//! - Optionally take a JSON config path as the only argument.

use std::process::ExitCode;
use typedstore_core::db::migrations::latest_version;
use typedstore_core::db::open_with_config;
use typedstore_core::{init_logging, CoreConfig, SqliteContext};

fn main() -> ExitCode {
    println!("typedstore_core ping={}", typedstore_core::ping());
    println!("typedstore_core version={}", typedstore_core::core_version());

    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("typedstore_cli error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: Option<String>) -> Result<(), String> {
    let config = match config_path {
        Some(path) => CoreConfig::load(path).map_err(|err| err.to_string())?,
        None => CoreConfig::default(),
    };
    if let Some(log) = config.log.as_ref() {
        init_logging(log)?;
    }

    let conn = open_with_config(&config.database).map_err(|err| err.to_string())?;
    let context = SqliteContext::try_new(&conn, &config.model).map_err(|err| err.to_string())?;

    println!("typedstore_core schema_version={}", latest_version());
    println!(
        "typedstore_core entities={}",
        context.entity_names().collect::<Vec<_>>().join(",")
    );
    log::info!("event=cli_probe module=cli status=ok");
    Ok(())
}

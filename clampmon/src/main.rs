use std::sync::mpsc::channel;

use clampmon::{config, monitor};
use log::error;

fn main() -> clampmon::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::load_config().inspect_err(|e| error!("{e}"))?;

    let (tx, rx) = channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    monitor::run(&config, &rx).inspect_err(|e| error!("{e}"))
}

use std::process::ExitCode;

use inkbridge::{Builder, StopToken};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let stop = StopToken::new();
    {
        let stop = stop.clone();
        if let Err(error) = ctrlc::set_handler(move || stop.stop()) {
            log::error!("failed to install signal handler: {error}");
            return ExitCode::FAILURE;
        }
    }

    let mut bridge = match Builder::new().stop_token(stop).build() {
        Ok(bridge) => bridge,
        Err(error) => {
            log::error!("startup failed: {error}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("bridge up, ^C to exit");
    match bridge.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("bridge stopped: {error}");
            ExitCode::FAILURE
        }
    }
}

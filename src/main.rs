use chordseq::config::AppConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("chordseq: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    log::debug!("starting with {:?}", config);

    match chordseq::repl::start(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("chordseq: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

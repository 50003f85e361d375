use clap::Parser;
use fins_bridge::config::BridgeConfig;
use fins_bridge::plc_log;
use fins_bridge::shutdown;
use fins_bridge::supervisor::Supervisor;
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

/// FINS/UDP to OPC UA data acquisition bridge with CSV fallback.
#[derive(Parser, Debug)]
#[command(name = "fins-bridge", version, about)]
struct Args {
    /// Re-read the OPC UA node descriptor even if one was already loaded.
    /// Passed through opaquely to the node-manager; the core itself still
    /// only loads the descriptor once per loop startup.
    #[arg(long)]
    reload: bool,

    /// Path to the PLC configuration JSON file.
    #[arg(short, long, default_value = "plc_data.json")]
    config: PathBuf,

    /// Always write CSV alongside OPC UA, instead of only on demotion.
    #[arg(long)]
    csv: bool,
}

fn main() -> ExitCode {
    plc_log::init_console_logging();
    let args = Args::parse();
    if args.reload {
        log::info!("--reload requested; node descriptor will be re-read by the node manager");
    }

    let plcs = match BridgeConfig::load(&args.config) {
        Ok(plcs) => plcs,
        Err(e) => {
            log::error!("configuration error: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    log::info!("loaded {} plc(s) from {}", plcs.len(), args.config.display());

    let signals = match shutdown::install_signal_handlers() {
        Ok(flags) => flags,
        Err(e) => {
            log::error!("failed to install signal handlers: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let cancel = signals.cancel;
    shutdown::spawn_force_exit_watchdog(std::sync::Arc::clone(&cancel));

    let plc_data_root = PathBuf::from("PLC_Data");
    let log_root = PathBuf::from("logs");
    let nodes_path = PathBuf::from("opcua_json_files/nodes.json");

    let supervisor = Supervisor::spawn(
        &plcs,
        args.csv,
        &plc_data_root,
        &log_root,
        &nodes_path,
        &cancel,
    );
    let code = supervisor.join_all();
    if signals.interrupted.load(std::sync::atomic::Ordering::SeqCst) {
        return ExitCode::from(EXIT_INTERRUPTED);
    }
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    ExitCode::from(code as u8)
}

use log::{error, info};
use std::io;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use serial_console::console::{self, ConsoleSink, prompt};
use serial_console::error::SerialConsoleError;
use serial_console::serial::{SerialConnector, Session, list_ports};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run());
    // stdin is read on a blocking thread that cannot be cancelled after Ctrl-C
    runtime.shutdown_background();
    code
}

async fn run() -> ExitCode {
    let ports = match list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    let settings = match prompt::select_settings(&mut input, &mut stdout, &ports).await {
        Ok(settings) => settings,
        Err(SerialConsoleError::NoPorts) => {
            println!("No serial ports detected!");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            println!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (mut session, drain) = Session::new(Box::new(SerialConnector));
    if let Err(e) = session.connect(settings.clone()).await {
        println!("Error opening serial port: {e}");
        return ExitCode::FAILURE;
    }
    println!(
        "Successfully opened {} at {}bps",
        session.port_name().unwrap_or(&settings.port_name),
        settings.baud_rate
    );

    let sink = ConsoleSink::new(io::stdout());
    let timestamps = sink.timestamps();
    let display = tokio::spawn(drain.run(sink));

    let result = tokio::select! {
        result = console::interact(&mut session, &mut input, &mut stdout, &timestamps) => result,
        _ = signal::ctrl_c() => {
            println!();
            println!("Program interrupted by user.");
            Ok(())
        }
    };
    if let Err(e) = &result {
        error!("Console input failed: {e}");
    }

    session.disconnect().await;
    println!("Serial port closed ({}).", session.state().await);

    // the drain ends once the session, and with it the last record sender, is gone
    drop(session);
    if let Err(e) = display.await {
        error!("Display task failed: {e}");
    }
    info!("Exiting");
    ExitCode::SUCCESS
}

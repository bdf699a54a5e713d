use clap::Parser;
use desktop_capture_lib::capture::config::ConfigHandle;
use desktop_capture_lib::capture::Backends;
use desktop_capture_lib::commands::args::{Args, Command};
use desktop_capture_lib::commands::native_host;
use desktop_capture_lib::commands::server::start_server;
use desktop_capture_lib::commands::service::ActivityService;
use desktop_capture_lib::recorder::sink::ClickLogger;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    desktop_capture_lib::init_tracing();

    tracing::info!("Starting Desktop Capture v{}", env!("CARGO_PKG_VERSION"));

    if args.command == Some(Command::NativeHost) {
        let logger = ClickLogger::new(ConfigHandle::new(args.capture_config()));
        let handled = tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            native_host::run(&mut stdin.lock(), &mut stdout.lock(), &logger)
        })
        .await??;
        tracing::debug!("Native host handled {} message(s)", handled);
        return Ok(());
    }

    let service = ActivityService::new(
        args.capture_config(),
        args.correlation_settings(),
        Backends::detect(),
    )?;
    if args.autostart {
        let status = service.start().await;
        tracing::info!(
            "Autostart: capture={} listener={}",
            status.capture_running,
            status.listener_running
        );
    }

    let shutdown = CancellationToken::new();
    let (addr, server) = start_server(args.bind_addr(), service.clone(), shutdown.clone()).await?;
    tracing::info!("Ready on http://{}", addr);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    service.shutdown().await;
    shutdown.cancel();
    server.await?;
    Ok(())
}

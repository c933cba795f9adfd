use anyhow::{Context, Result};
use clap::ArgMatches;
use log::{info, warn};
use tokio::sync::watch;

use crate::config::{Config, DeviceRegistry};
use crate::modbus::ModbusClient;
use crate::output::CsvSink;
use crate::services::{MeasurementOrchestrator, PollScheduler};

pub async fn handle_subcommands(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("init-config", sub)) => {
            let path = sub
                .get_one::<String>("path")
                .context("init-config needs a path")?;
            Config::default().save_to_file(path)?;
            println!("✅ Default configuration written to {}", path);
            Ok(())
        }
        Some(("list-ports", _)) => list_serial_ports(),
        Some(("check-config", _)) => {
            let config = Config::from_matches(matches)?;
            let registry = config.registry()?;
            print_registry(&registry);
            Ok(())
        }
        Some(("poll-once", _)) => poll_once(matches).await,
        _ => run(matches).await,
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let config = Config::from_matches(matches)?;
    let registry = config.registry()?;

    let client = ModbusClient::new(config.serial.clone());
    let mut sink = CsvSink::create_sinks(&registry, &config.output);
    for handle in sink.disabled() {
        warn!(
            "⚠️  {} will not be logged: {}",
            handle.key,
            handle.disabled_reason().unwrap_or("unavailable")
        );
    }

    let orchestrator = MeasurementOrchestrator::new(registry, config.polling.request_gap());
    let scheduler = PollScheduler::new(
        orchestrator,
        config.polling.interval(),
        config.polling.max_cycles,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl+C received, stopping after the current cycle");
            let _ = stop_tx.send(true);
        }
    });

    let summary = scheduler.run(&client, &mut sink, stop_rx).await?;

    info!("📊 Final Statistics:");
    info!("   🔁 Cycles: {}", summary.cycles);
    info!(
        "   ✅ Measurements: {} ok, {} failed",
        summary.measurements_ok, summary.measurements_failed
    );
    info!(
        "   📝 Rows: {} written, {} skipped, {} sink errors",
        summary.rows_written, summary.rows_skipped, summary.sink_errors
    );
    Ok(())
}

async fn poll_once(matches: &ArgMatches) -> Result<()> {
    let config = Config::from_matches(matches)?;
    let registry = config.registry()?;
    let client = ModbusClient::new(config.serial.clone());
    let orchestrator = MeasurementOrchestrator::new(registry, config.polling.request_gap());

    let cycle = orchestrator.run_cycle(&client, 1).await?;
    for measurement in &cycle.measurements {
        match measurement.failure {
            None => println!(
                "{}: {}",
                measurement.key,
                measurement
                    .values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Some(kind) => println!("{}: failed ({})", measurement.key, kind),
        }
    }
    Ok(())
}

fn print_registry(registry: &DeviceRegistry) {
    println!("📋 {} targets configured", registry.target_count());
    for device_type in registry.device_types() {
        println!(
            "🏷️  {} | addresses {:?} | byte order {} | word order {}",
            device_type.type_id, device_type.addresses, device_type.byte_order, device_type.word_order
        );
        for metric in &device_type.metrics {
            let window = &metric.window;
            println!(
                "   📊 {}: registers {}..{} ({} fields)",
                metric.name,
                window.start_address,
                window.start_address as u32 + window.register_count as u32 - 1,
                window.layout.arity()
            );
            for field in window.layout.fields() {
                println!(
                    "      • {} ({}-bit {})",
                    field.name,
                    u8::from(field.width),
                    if field.signed { "signed" } else { "unsigned" }
                );
            }
        }
    }
}

fn list_serial_ports() -> Result<()> {
    println!("📡 Available Serial Ports:");

    let ports = serialport::available_ports().context("cannot enumerate serial ports")?;
    if ports.is_empty() {
        println!("   ⚠️  No serial ports found");
        return Ok(());
    }

    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {}", index + 1, port.port_name);
        if let serialport::SerialPortType::UsbPort(usb_info) = &port.port_type {
            if let Some(manufacturer) = &usb_info.manufacturer {
                println!("      📱 Manufacturer: {}", manufacturer);
            }
            if let Some(serial_number) = &usb_info.serial_number {
                println!("      🔢 Serial Number: {}", serial_number);
            }
        }
    }

    Ok(())
}

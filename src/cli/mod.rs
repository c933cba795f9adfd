pub mod commands;

use clap::{Arg, ArgAction, Command};

pub use commands::handle_subcommands;

pub fn build_cli() -> Command {
    Command::new("mbus-logger")
        .version(crate::VERSION)
        .about("Polls Modbus RTU field devices and logs their registers")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .help("TOML configuration file (built-in defaults when omitted)"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .global(true)
                .help("Serial port, e.g. /dev/ttyUSB0 or COM5"),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .global(true)
                .help("Baud rate"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .global(true)
                .help("Seconds between poll cycles"),
        )
        .arg(
            Arg::new("cycles")
                .short('n')
                .long("cycles")
                .global(true)
                .help("Stop after this many cycles"),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .global(true)
                .help("Directory for the per-metric log files"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging, including raw reply frames"),
        )
        .subcommand(Command::new("run").about("Poll on the configured interval (default)"))
        .subcommand(Command::new("poll-once").about("Run one cycle and print the decoded values"))
        .subcommand(Command::new("check-config").about("Validate the device registry and print it"))
        .subcommand(
            Command::new("init-config")
                .about("Write the default configuration to a file")
                .arg(Arg::new("path").required(true)),
        )
        .subcommand(Command::new("list-ports").about("List serial ports on this host"))
}

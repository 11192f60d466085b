use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("edusphere")
        .about("Live metrics, presence and notifications for EduSphere")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("metrics")
                .about("Fetch the dashboard metrics once from the configured backend")
                .arg(json_arg("Output metrics as JSON")),
        )
        .subcommand(
            Command::new("watch")
                .about("Keep the dashboard metrics in sync by polling the configured backend")
                .arg(json_arg("Output each snapshot as a JSON line"))
                .arg(seconds_arg(None))
                .arg(
                    Arg::new("polling-interval-ms")
                        .long("polling-interval-ms")
                        .help("Override the fallback polling interval")
                        .value_parser(clap::value_parser!(u64).range(1..)),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run metrics, presence and notifications against an in-memory backend")
                .arg(json_arg("Output snapshots and summary as JSON lines"))
                .arg(seconds_arg(Some("3")))
                .arg(
                    Arg::new("reduced-motion")
                        .long("reduced-motion")
                        .help("Snap displayed values instead of animating them")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("user")
                        .long("user")
                        .help("User id to sign in as")
                        .default_value("learner-1"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Show the resolved configuration")
                .arg(json_arg("Output configuration as JSON")),
        )
}

fn json_arg(help: &'static str) -> Arg {
    Arg::new("json")
        .long("json")
        .help(help)
        .action(ArgAction::SetTrue)
}

fn seconds_arg(default: Option<&'static str>) -> Arg {
    let arg = Arg::new("seconds")
        .long("seconds")
        .help("Stop after this many seconds")
        .value_parser(clap::value_parser!(u64).range(1..));
    match default {
        Some(value) => arg.default_value(value),
        None => arg,
    }
}

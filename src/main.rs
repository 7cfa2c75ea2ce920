use std::process::ExitCode;

use busbar::{
    bench::{run, BenchConfig},
    inproc::InprocTransport,
    udp::UdpTransport,
};

const USAGE: &str =
    "Usage: busbar <addressTemplate> <messageCount> <messageSizeBytes> <participantCount>
Where <addressTemplate> contains one %d placeholder replaced by each
participant's bus position, e.g. udp://127.0.0.1:300%d or inproc://bus%d.";

fn main() -> ExitCode {
    use tracing_subscriber::layer::SubscriberExt;
    let subscriber =
        tracing_subscriber::Registry::default().with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((template, message_count, message_size, participants)) = parse_args(&args) else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let config = BenchConfig::new(message_count, message_size, participants);
    let result = if template.starts_with("inproc://") {
        run(InprocTransport::new(), template, config)
    } else if template.starts_with("udp://") {
        run(UdpTransport::default(), template, config)
    } else {
        eprintln!("Unsupported transport scheme in {template} (expected inproc:// or udp://)");
        return ExitCode::FAILURE;
    };

    match result {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Option<(&str, u32, usize, usize)> {
    match args {
        [template, message_count, message_size, participants] => Some((
            template,
            message_count.parse().ok()?,
            message_size.parse().ok()?,
            participants.parse().ok()?,
        )),
        _ => None,
    }
}

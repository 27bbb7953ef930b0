mod app;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use retmap_input::{polarity_mask, InputPoller, SimulatedDevice};
use retmap_render::RenderConfig;
use retmap_session::{
    create_out_folder, write_frame_durations, EventSink, FrameLoop, Modality, ParticipantInfo,
    SessionConfig, SessionLog,
};
use retmap_timing::MonotonicClock;

use app::WindowDisplay;

const USAGE: &str = "\
Usage: retmap <bars|wedge> [options]

Options:
  --subject <id>        Participant identifier (default: anon)
  --operator <name>     Operator name (default: unknown)
  --out <dir>           Output directory root (default: .)
  --button-box          Gate the run on the hardware trigger channel
  --mri                 Invert button polarity for the scanner box
  --sim-trigger <secs>  Simulated device pulls the trigger after <secs>
  --debug               Draw the FPS/phase overlay
  --windowed            Run in a window instead of fullscreen
  -h, --help            Show this help
";

struct Cli {
    modality: Modality,
    participant: ParticipantInfo,
    out: PathBuf,
    button_box: bool,
    mri: bool,
    sim_trigger_secs: Option<f64>,
    debug: bool,
    windowed: bool,
}

/// What the command line asked for.
enum CliCommand {
    Run(Cli),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliCommand> {
    let mut modality = None;
    let mut subject = String::from("anon");
    let mut operator = String::from("unknown");
    let mut out = PathBuf::from(".");
    let mut button_box = false;
    let mut mri = false;
    let mut sim_trigger_secs = None;
    let mut debug = false;
    let mut windowed = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "bars" => modality = Some(Modality::Bars),
            "wedge" => modality = Some(Modality::Wedge),
            "--subject" => {
                subject = args.next().context("--subject needs a value")?;
            }
            "--operator" => {
                operator = args.next().context("--operator needs a value")?;
            }
            "--out" => {
                out = PathBuf::from(args.next().context("--out needs a value")?);
            }
            "--button-box" => button_box = true,
            "--mri" => mri = true,
            "--sim-trigger" => {
                let secs = args.next().context("--sim-trigger needs a value")?;
                sim_trigger_secs =
                    Some(secs.parse().context("--sim-trigger expects seconds")?);
            }
            "--debug" => debug = true,
            "--windowed" => windowed = true,
            "-h" | "--help" => return Ok(CliCommand::Help),
            other => bail!("unknown argument `{other}`\n\n{USAGE}"),
        }
    }

    let Some(modality) = modality else {
        bail!("missing modality\n\n{USAGE}");
    };
    Ok(CliCommand::Run(Cli {
        modality,
        participant: ParticipantInfo { subject, operator },
        out,
        button_box,
        mri,
        sim_trigger_secs,
        debug,
        windowed,
    }))
}

/// The register state the button box reported at startup belongs in the
/// session record, next to the participant prologue.
fn log_initial_register(log: &mut dyn EventSink, poller: &InputPoller) {
    match poller.initial_register() {
        Some(bits) => log.record(&format!(
            "initial button box digital input state: {bits:016b}"
        )),
        None => log.record("initial button box digital input state unavailable"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match cli.modality {
        Modality::Bars => SessionConfig::bars(),
        Modality::Wedge => SessionConfig::wedge(),
    };
    config.use_button_box = cli.button_box;
    config.mri_polarity = cli.mri;
    config.debug_overlay = cli.debug;

    let base = cli.out.join(format!(
        "{}_{}_{}",
        chrono::Local::now().format("%Y-%m-%d"),
        cli.participant.subject,
        cli.modality.label()
    ));
    let out_dir = create_out_folder(&base)?;
    info!(dir = %out_dir.display(), "session output folder");

    let mut log = SessionLog::create(&out_dir.join("session.log"))?;
    log.record(&format!("subject: {}", cli.participant.subject));
    log.record(&format!("operator: {}", cli.participant.operator));
    log.record(&format!("modality: {}", cli.modality.label()));

    let poller = if config.use_button_box {
        let device = match cli.sim_trigger_secs {
            Some(secs) => SimulatedDevice::with_trigger_after(secs),
            None => SimulatedDevice::idle(),
        };
        Some(InputPoller::start(
            device,
            polarity_mask(config.mri_polarity),
        )?)
    } else {
        None
    };
    if let Some(p) = &poller {
        log_initial_register(&mut log, p);
    }

    let render_config = RenderConfig::from_session(&config);
    let (mut display, mut input) = WindowDisplay::new(render_config, cli.windowed)?;

    let mut frame_loop = FrameLoop::new(config, MonotonicClock::new());
    let outcome = frame_loop.run(&mut display, &mut input, poller.as_ref(), &mut log);

    // The frame-duration artifact is written even when the run aborted,
    // so a partial acquisition can still be inspected.
    write_frame_durations(
        &out_dir.join("frames_durations.json"),
        frame_loop.frame_intervals().excluding_startup(),
    )?;

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            log.record(&format!("run aborted: {e:#}"));
            return Err(e.context("stimulation run aborted"));
        }
    };
    log.record("end of session");
    let summary_file = File::create(out_dir.join("run_summary.json"))
        .context("creating run summary file")?;
    serde_json::to_writer_pretty(BufWriter::new(summary_file), &summary)
        .context("writing run summary")?;
    info!(
        total_secs = summary.total_secs,
        dropped_frames = summary.dropped_frames,
        cancelled = summary.cancelled,
        "session complete"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(CliCommand::Run(cli)) => cli,
        Ok(CliCommand::Help) => {
            print!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "session failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliCommand> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    fn parse_run(args: &[&str]) -> Cli {
        match parse(args).unwrap() {
            CliCommand::Run(cli) => cli,
            CliCommand::Help => panic!("expected a run command"),
        }
    }

    #[test]
    fn modality_is_required() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--debug"]).is_err());
        assert_eq!(parse_run(&["bars"]).modality, Modality::Bars);
        assert_eq!(parse_run(&["wedge"]).modality, Modality::Wedge);
    }

    #[test]
    fn help_is_a_command_not_an_error() {
        assert!(matches!(parse(&["-h"]), Ok(CliCommand::Help)));
        assert!(matches!(parse(&["bars", "--help"]), Ok(CliCommand::Help)));
    }

    #[test]
    fn flags_and_values_are_parsed() {
        let cli = parse_run(&[
            "wedge",
            "--subject",
            "s01",
            "--operator",
            "op",
            "--button-box",
            "--mri",
            "--sim-trigger",
            "2.5",
            "--debug",
            "--windowed",
            "--out",
            "/tmp/runs",
        ]);
        assert_eq!(cli.participant.subject, "s01");
        assert_eq!(cli.participant.operator, "op");
        assert!(cli.button_box && cli.mri && cli.debug && cli.windowed);
        assert_eq!(cli.sim_trigger_secs, Some(2.5));
        assert_eq!(cli.out, PathBuf::from("/tmp/runs"));
    }

    #[test]
    fn unknown_arguments_are_rejected() {
        assert!(parse(&["bars", "--frobnicate"]).is_err());
        assert!(parse(&["bars", "--sim-trigger", "abc"]).is_err());
    }

    #[test]
    fn initial_register_state_reaches_the_session_record() {
        struct VecSink(Vec<String>);
        impl EventSink for VecSink {
            fn record(&mut self, msg: &str) {
                self.0.push(msg.to_string());
            }
        }

        let poller = InputPoller::start(SimulatedDevice::idle(), polarity_mask(false)).unwrap();
        let mut sink = VecSink(Vec::new());
        log_initial_register(&mut sink, &poller);
        poller.stop();

        assert_eq!(sink.0.len(), 1);
        // The simulated box idles with only the trigger line high.
        assert_eq!(
            sink.0[0],
            "initial button box digital input state: 0000000000010000"
        );
    }
}

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use iotr_monitor::argsets::{CheckConfigArgs, MonitorArgs};
use iotr_monitor::monitor::ReconnectPolicy;
use iotr_monitor::{command, helpers};

const CMD_MONITOR: &str = "monitor";
const CMD_CHECK_CONFIG: &str = "check-config";

const HELP: &str = "\
iotr-monitor - monitor IoTR robots over MQTT

USAGE:
  iotr-monitor [monitor] [--path DIR] [--log-dir DIR] [--reconnect POLICY]
  iotr-monitor check-config [--path DIR]

OPTIONS:
  --path DIR          Settings home holding devices/*.json [env: IOTR_HOME, default: .]
  --log-dir DIR       Directory for daily log files [default: first device's log path]
  --reconnect POLICY  never | fixed[:SECS] | backoff[:INITIAL:MAX] [default: never]
  -h, --help          Print this help
";

fn main() -> Result<()> {
    helpers::load_dotenv();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let subcommand = args.subcommand()?;
    let home: PathBuf = args
        .opt_value_from_str("--path")?
        .unwrap_or_else(helpers::base_path::home_dir);

    match subcommand.as_deref() {
        None | Some(CMD_MONITOR) => {
            let monitor_args = MonitorArgs {
                home,
                log_dir: args.opt_value_from_str("--log-dir")?,
                reconnect: args
                    .opt_value_from_str::<_, ReconnectPolicy>("--reconnect")?
                    .unwrap_or_default(),
            };
            reject_leftovers(args)?;
            command::monitor(monitor_args)
        }
        Some(CMD_CHECK_CONFIG) => {
            reject_leftovers(args)?;
            command::check_config(CheckConfigArgs { home })
        }
        Some(other) => Err(anyhow!(
            "Subcommand must be one of 'monitor', 'check-config'; got '{other}'"
        )),
    }
}

fn reject_leftovers(args: pico_args::Arguments) -> Result<()> {
    let leftovers = args.finish();
    if !leftovers.is_empty() {
        return Err(anyhow!("Unexpected arguments: {:?}", leftovers));
    }
    Ok(())
}

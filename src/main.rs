use std::env;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flexi_logger::{FileSpec, Logger};
use log::info;

use takerun::{default_format, runner_info, ProcessRunner, TakerError, TakerExit};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  #[command(about = "Execute a run request and print the results document")]
  Run {
    #[arg(help = "Parameters document (JSON); reads stdin when omitted")]
    params: Option<PathBuf>,
  },

  #[command(about = "Print the runner self-description")]
  Info,
}

fn read_request(path: Option<PathBuf>) -> Result<String, TakerError> {
  match path {
    Some(path) => Ok(fs::read_to_string(path)?),
    None => {
      let mut text = String::new();
      std::io::stdin().read_to_string(&mut text)?;
      Ok(text)
    }
  }
}

fn bootstrap() -> Result<(), TakerError> {
  Logger::try_with_str("takerun=info")?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("TAKERUN_LOG").unwrap_or("./logs/".into()))
        .basename("takerun")
        .discriminant(format!(
          "{}",
          chrono::offset::Local::now().format("%Y-%m-%d")
        ))
        .suppress_timestamp(),
    )
    .append()
    .format_for_files(default_format)
    .start()?;

  let cli = Cli::parse();
  match cli.command {
    Commands::Run { params } => {
      info!("Start running takerun");
      let text = read_request(params)?;
      let mut runner = ProcessRunner::new();
      runner.params_mut().load_json_str(&text)?;
      let results = runner.execute()?;
      info!("Running takerun finished: {}", results.status.as_str());
      println!("{}", results.save_json_str()?);
      Ok(())
    }
    Commands::Info => {
      println!("{}", serde_json::to_string_pretty(&runner_info())?);
      Ok(())
    }
  }
}

fn main() -> TakerExit {
  match bootstrap() {
    Ok(_) => TakerExit::Ok,
    Err(err) => TakerExit::Err(err),
  }
}

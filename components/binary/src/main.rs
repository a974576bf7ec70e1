// Copyright 2024 regio
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod cmd;

use clap::{Parser, Subcommand};
use regio_common::REGIO;
use snafu::Whatever;

use crate::cmd::{cat::CatArgs, compact::CompactArgs, export::ExportArgs, info::InfoArgs};

#[derive(Debug, Parser)]
#[clap(name = REGIO, about = "inspect and maintain region files", version)]
struct Cli {
    #[arg(long, global = true, default_value = "info", help = "log level when RUST_LOG is unset")]
    log_level: String,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Info(InfoArgs),
    Cat(CatArgs),
    Export(ExportArgs),
    Compact(CompactArgs),
}

fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    regio_utils::logger::init_log(&cli.log_level);
    match cli.commands {
        Commands::Info(info_args) => info_args.run(),
        Commands::Cat(cat_args) => cat_args.run(),
        Commands::Export(export_args) => export_args.run(),
        Commands::Compact(compact_args) => compact_args.run(),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_named_after_the_tool() {
        let cmd = Cli::command();
        cmd.clone().debug_assert();
        assert_eq!(cmd.get_name(), REGIO);
    }
}

//! Decode JSON person records, one per line

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pipekit_codec::{JsonDecoder, Text};
use pipekit_config::Config;
use pipekit_io::DelimitedReader;
use pipekit_pipeline::{NopClose, Pipeline, process_fn};
use serde::{Deserialize, Serialize};

use super::{RunArgs, create_output, pipeline_config, shutdown_token, summarize};

#[derive(Args, Debug)]
pub struct JsonArgs {
    /// Newline-delimited JSON file
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Also write descriptions to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Reject records carrying fields other than first_name and last_name
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
}

pub fn describe(person: &Person) -> String {
    format!(
        "Processor sees: First Name = {} Last Name = {}\n",
        person.first_name, person.last_name
    )
}

pub async fn run(args: JsonArgs, config: &Config) -> Result<()> {
    let decoder = if args.strict {
        JsonDecoder::<Person>::strict()
    } else {
        JsonDecoder::<Person>::new()
    };

    let reader = DelimitedReader::open(&args.input)
        .await
        .with_context(|| format!("failed to open {}", args.input.display()))?
        .with_max_message_size(config.runtime.max_message_size);

    let mut pipeline = Pipeline::new(
        "json",
        process_fn(|person: Person| async move { Ok(describe(&person)) }),
    );
    pipeline
        .set_config(pipeline_config(&config.runtime))
        .add_message_source(reader, decoder)
        .add_writer(NopClose::new(tokio::io::stdout()), Text);
    if let Some(output) = &args.output {
        pipeline.add_writer(create_output(output).await?, Text);
    }

    let report = pipeline.run(shutdown_token(args.run.timeout())).await;
    summarize(&[report])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(input: PathBuf, output: PathBuf, strict: bool) -> JsonArgs {
        JsonArgs {
            input,
            output: Some(output),
            strict,
            run: RunArgs::default(),
        }
    }

    #[test]
    fn test_describe() {
        let person = Person {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        };
        assert_eq!(
            describe(&person),
            "Processor sees: First Name = Ada Last Name = Lovelace\n"
        );
    }

    #[tokio::test]
    async fn test_run_lenient_and_strict() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("people.jsonl");
        std::fs::write(
            &input,
            concat!(
                r#"{"first_name":"Ada","last_name":"Lovelace"}"#,
                "\n",
                r#"{"first_name":"Alan","last_name":"Turing","born":1912}"#,
                "\n",
                "garbage\n",
            ),
        )
        .unwrap();

        let lenient = dir.path().join("lenient.txt");
        run(args(input.clone(), lenient.clone(), false), &Config::default())
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&lenient).unwrap(),
            "Processor sees: First Name = Ada Last Name = Lovelace\n\
             Processor sees: First Name = Alan Last Name = Turing\n"
        );

        let strict = dir.path().join("strict.txt");
        run(args(input, strict.clone(), true), &Config::default())
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&strict).unwrap(),
            "Processor sees: First Name = Ada Last Name = Lovelace\n"
        );
    }
}

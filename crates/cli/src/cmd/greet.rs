//! Fan names out to coupled greeting pipelines
//!
//! ```text
//!                          ┌──→ "Hello there," ──→ stdout, output1.txt
//! names.txt ──→ reader ──┤
//!                          └──→ "Goodbye,"     ──→ stdout, output2.txt
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use clap::Args;
use pipekit_codec::{Printer, Text};
use pipekit_config::Config;
use pipekit_io::DelimitedReader;
use pipekit_pipeline::{
    Context, NopClose, Pipeline, PipelineError, Processor, Runnable, process_fn, run_many,
};

use super::{RunArgs, create_output, pipeline_config, shutdown_token, summarize};

const GREETINGS: [&str; 2] = ["Hello there,", "Goodbye,"];

#[derive(Args, Debug)]
pub struct GreetArgs {
    /// File with one name per line
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Directory receiving output1.txt, output2.txt, ...
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub name: String,
}

/// Turns a person into a greeting line
pub struct Greeter {
    greeting: String,
}

impl Greeter {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: greeting.into(),
        }
    }
}

#[async_trait]
impl Processor<Person, String> for Greeter {
    async fn process(&self, _cx: &Context, person: Person) -> Result<String, PipelineError> {
        if person.name.is_empty() {
            return Err(PipelineError::process("cannot greet a nameless person"));
        }
        Ok(format!("{} {}\n", self.greeting, person.name))
    }
}

pub async fn run(args: GreetArgs, config: &Config) -> Result<()> {
    let pipeline_config = pipeline_config(&config.runtime);

    let reader = DelimitedReader::open(&args.input)
        .await
        .with_context(|| format!("failed to open {}", args.input.display()))?
        .with_max_message_size(config.runtime.max_message_size);

    let mut names = Pipeline::new(
        "names",
        process_fn(|line: String| async move {
            Ok(Person {
                name: line.trim().to_string(),
            })
        }),
    );
    names
        .set_config(pipeline_config)
        .add_message_source(reader, Text);

    let mut greeters = Vec::with_capacity(GREETINGS.len());
    for (i, greeting) in GREETINGS.iter().enumerate() {
        let output = args.output_dir.join(format!("output{}.txt", i + 1));
        let mut greeter = Pipeline::new(format!("greeter{}", i + 1), Greeter::new(*greeting));
        greeter
            .set_config(pipeline_config)
            .add_writer(NopClose::new(tokio::io::stdout()), Printer)
            .add_writer(create_output(&output).await?, Printer);
        names.join(&mut greeter);
        greeters.push(greeter);
    }

    let mut pipelines: Vec<Box<dyn Runnable>> = vec![names.boxed()];
    pipelines.extend(greeters.into_iter().map(Pipeline::boxed));

    let reports = run_many(pipelines, shutdown_token(args.run.timeout())).await;
    summarize(&reports)
}

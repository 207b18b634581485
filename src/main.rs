use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dialoguer::Input;
use tracing_subscriber::EnvFilter;

use voxroute::llm::OllamaClient;
use voxroute::{
    Config, HttpHandlerBackend, RouteOutcome, Router, SpeechToText, StreamEvent, TextToSpeech,
};

/// Queries the demo runs side by side
const DEMO_QUERIES: [&str; 3] = [
    "Set the thermostat to 72 degrees",
    "How do you say konnichiwa?",
    "What is machine learning?",
];

/// Words that end the interactive loop
const QUIT_WORDS: [&str; 4] = ["quit", "exit", "bye", "q"];

/// voxroute - Route voice-assistant queries to specialized handlers
#[derive(Parser)]
#[command(name = "voxroute", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/voxroute/config.toml)
    #[arg(short, long, env = "VOXROUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Speak each routed response through the TTS server
    #[arg(long, global = true)]
    tts: bool,

    /// Print assistant answers as they are generated
    #[arg(long, global = true)]
    stream: bool,

    /// Where `--tts` writes synthesized audio
    #[arg(long, global = true, default_value = "response.wav")]
    audio_out: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Route a single query
    Ask {
        /// Query text
        #[arg(required = true)]
        query: Vec<String>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read queries from the terminal until told to quit
    Interactive,
    /// Route the sample queries concurrently
    Demo,
    /// Transcribe an audio file
    Transcribe {
        /// Audio file to transcribe
        file: PathBuf,

        /// Route the transcript as a query
        #[arg(long)]
        route: bool,
    },
    /// Synthesize text to an audio file
    Speak {
        /// Text to speak
        text: String,

        /// Output file
        #[arg(short, long, default_value = "speech.wav")]
        out: PathBuf,
    },
    /// Check the external services
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voxroute=info",
        1 => "info,voxroute=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let speaker = if cli.tts {
        Some(build_tts(&config)?)
    } else {
        None
    };
    let output = Output {
        speaker: speaker.as_ref(),
        audio_out: &cli.audio_out,
        stream: cli.stream,
    };

    match cli.command.unwrap_or(Command::Interactive) {
        Command::Ask { query, json } => {
            let router = Router::from_config(&config)?;
            let query = query.join(" ");
            let outcome = if json {
                let outcome = router.process(&query).await;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                outcome
            } else {
                output.route(&router, &query).await
            };
            output.speak(&outcome).await;
        }
        Command::Interactive => {
            let router = Router::from_config(&config)?;
            interactive(&router, &output).await;
        }
        Command::Demo => {
            let router = Router::from_config(&config)?;
            demo(&router).await;
        }
        Command::Transcribe { file, route } => {
            let stt = SpeechToText::new(
                &config.voice.stt_url,
                &config.voice.stt_model,
                &config.voice.stt_language,
                config.voice.stt_timeout,
            )?;
            let router = if route {
                Some(Router::from_config(&config)?)
            } else {
                None
            };
            transcribe(&stt, &file, router.as_ref(), &output).await;
        }
        Command::Speak { text, out } => {
            let tts = build_tts(&config)?;
            match tts.synthesize_to_file(&text, &out).await {
                Ok(()) => println!("Wrote {}", out.display()),
                Err(e) => eprintln!("Speech synthesis failed: {e}"),
            }
        }
        Command::Status => status(&config).await?,
    }

    Ok(())
}

fn build_tts(config: &Config) -> voxroute::Result<TextToSpeech> {
    let tts = TextToSpeech::new(
        &config.voice.tts_url,
        &config.voice.tts_voice,
        config.voice.tts_timeout,
    )?;
    Ok(match &config.voice.tts_reference_audio {
        Some(reference) => tts.with_reference_audio(reference),
        None => tts,
    })
}

/// How routed responses reach the user
struct Output<'a> {
    speaker: Option<&'a TextToSpeech>,
    audio_out: &'a Path,
    stream: bool,
}

impl Output<'_> {
    /// Route `query` and print the outcome
    ///
    /// With `--stream`, assistant output is printed raw as it arrives and the
    /// normalized response is only printed when nothing was streamed.
    async fn route(&self, router: &Router, query: &str) -> RouteOutcome {
        if !self.stream {
            let outcome = router.process(query).await;
            print_outcome(&outcome);
            return outcome;
        }

        let mut announced = false;
        let outcome = router
            .process_stream(query, |event| match event {
                StreamEvent::Classified(classification) => {
                    print_route(classification.category, classification.confidence);
                    announced = true;
                }
                StreamEvent::Chunk(chunk) => {
                    print!("{chunk}");
                    std::io::stdout().flush().ok();
                }
            })
            .await;

        if outcome.streamed {
            println!();
        } else if announced {
            println!("{}", outcome.response);
        } else {
            print_outcome(&outcome);
        }
        outcome
    }

    async fn speak(&self, outcome: &RouteOutcome) {
        let Some(tts) = self.speaker else {
            return;
        };
        match tts.synthesize_to_file(&outcome.response, self.audio_out).await {
            Ok(()) => println!("🔊 Audio saved to {}", self.audio_out.display()),
            Err(e) => eprintln!("Speech synthesis failed: {e}"),
        }
    }
}

fn print_route(category: voxroute::Category, confidence: f64) {
    println!("📍 Routed to {category} (confidence {confidence:.2})");
}

fn print_outcome(outcome: &RouteOutcome) {
    print_route(outcome.category, outcome.classification.confidence);
    println!("{}", outcome.response);
}

async fn interactive(router: &Router, output: &Output<'_>) {
    println!("voxroute interactive mode. Type 'quit' to exit.");
    println!("Handlers configured for: {:?}\n", router.registry().configured());

    loop {
        let line = tokio::task::spawn_blocking(|| {
            Input::<String>::new()
                .with_prompt("You")
                .allow_empty(true)
                .interact_text()
        })
        .await;

        let query = match line {
            Ok(Ok(query)) => query,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "input closed");
                break;
            }
            Err(e) => {
                eprintln!("Input failed: {e}");
                break;
            }
        };

        let query = query.trim();
        if QUIT_WORDS.iter().any(|w| query.eq_ignore_ascii_case(w)) {
            break;
        }
        if query.is_empty() {
            continue;
        }

        let outcome = output.route(router, query).await;
        output.speak(&outcome).await;
        println!();
    }

    println!("Goodbye!");
}

async fn demo(router: &Router) {
    let outcomes =
        futures::future::join_all(DEMO_QUERIES.iter().map(|query| router.process(query))).await;

    for (query, outcome) in DEMO_QUERIES.iter().zip(outcomes) {
        println!("❓ {query}");
        print_outcome(&outcome);
        println!();
    }
}

async fn transcribe(stt: &SpeechToText, file: &Path, router: Option<&Router>, output: &Output<'_>) {
    let transcription = match stt.transcribe(file).await {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Transcription failed: {e}");
            return;
        }
    };

    println!("📝 {}", transcription.text);
    if let Some(language) = &transcription.language {
        println!("   language: {language}");
    }

    if let Some(router) = router {
        let outcome = output.route(router, &transcription.text).await;
        output.speak(&outcome).await;
    }
}

async fn status(config: &Config) -> anyhow::Result<()> {
    let llm = OllamaClient::new(&config.llm.url, &config.llm.model, config.llm.timeout)?;
    let workflows = HttpHandlerBackend::new(
        &config.workflows.base_url,
        config.workflows.api_key.clone(),
        std::sync::Arc::new(llm.clone()),
    );
    let stt = SpeechToText::new(
        &config.voice.stt_url,
        &config.voice.stt_model,
        &config.voice.stt_language,
        config.voice.stt_timeout,
    )?;
    let tts = build_tts(config)?;

    let (llm_up, workflows_up, stt_up, tts_up) = tokio::join!(
        llm.is_available(),
        workflows.is_available(),
        stt.is_available(),
        tts.is_available(),
    );

    for (name, url, up) in [
        ("LLM", &config.llm.url, llm_up),
        ("Workflows", &config.workflows.base_url, workflows_up),
        ("STT", &config.voice.stt_url, stt_up),
        ("TTS", &config.voice.tts_url, tts_up),
    ] {
        let mark = if up { "✅ up" } else { "❌ down" };
        println!("{name:<10} {mark:<8} {url}");
    }

    Ok(())
}

use std::env;
use std::fs::metadata;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use futures::StreamExt;
use lexitree::btree::{build_index, IndexedWords};
use lexitree::dict::{BtreeDictionary, Dictionary};
use lexitree::io::file::{FileHeader, IndexFile};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use strum::EnumString;

const MAX_RESULTS: usize = 20;
const STEM_MIN_LENGTH: usize = 3;
const STEM_SUFFIX_VARIATION: usize = 2;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Index location
    index: String,

    #[command(subcommand)]
    parameter: Option<Parameter>,
}

#[derive(Debug, EnumString, Subcommand)]
#[strum(ascii_case_insensitive)]
enum Parameter {
    /// Build the index from a word list (word<TAB>article-offset per line)
    Build { words: String },
    /// Exact lookup for this word
    Find { word: String },
    /// Interactive Help
    Help,
    /// Display index information
    Info,
    /// List indexed headwords
    Keys,
    /// Prefix search for this word
    Prefix { word: String },
    /// Stemmed search for this word
    Stemmed { word: String },
}

fn get_history_file() -> Option<PathBuf> {
    dirs::preference_dir()
        .and_then(|mut base| {
            base.push("lexitree");
            // Note: Not create_dir_all(), because we don't want to create preference
            // dirs if they don't exist.
            if metadata(base.clone()).ok().is_none() {
                std::fs::create_dir(base.clone()).ok()?
            }
            Some(base)
        })
        .map(|mut base| {
            base.push("history.txt");
            base
        })
}

async fn build(index: &str, words_path: &str) -> Result<()> {
    let contents = std::fs::read_to_string(words_path)?;

    let mut words = IndexedWords::new();
    for (number, line) in contents.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        // Lines without an explicit article offset get their line number.
        let (word, offset) = match line.split_once('\t') {
            Some((word, offset)) => (word, offset.trim().parse()?),
            None => (line, number as u32),
        };
        words.add_word(word, offset);
    }

    let mut file = IndexFile::create(index).await?;
    let info = build_index(&words, &mut file).await?;
    FileHeader::new(info).write(&mut file).await?;
    file.sync().await?;

    println!("indexed {} keys (fanout {})", words.len(), info.fanout);
    Ok(())
}

async fn interactive(dictionary: BtreeDictionary) -> Result<()> {
    // `()` can be used when no completer is required
    let mut rl = DefaultEditor::new()?;
    if let Some(file_location) = get_history_file() {
        if let Err(e) = rl.load_history(&file_location) {
            println!("error loading history: {e}");
        }
    }
    println!("terminate with ctrl-c or ctrl-d");
    loop {
        let readline = rl.readline("word: ");
        match readline {
            Ok(line) => {
                if line.is_empty() {
                    continue;
                }
                // EnumString doesn't deal with variant parameters, so...
                let trimmed = line.trim_start();
                let words = trimmed.split_whitespace().collect::<Vec<&str>>();
                if words.is_empty() {
                    continue;
                }
                let parameter = match Parameter::from_str(words[0]) {
                    Ok(p) => {
                        // Commands taking a word accept the rest of the line,
                        // headwords may contain spaces.
                        let rest = trimmed[words[0].len()..].trim().to_string();
                        match p {
                            Parameter::Build { words: _ } => {
                                println!("build is not available interactively");
                                continue;
                            }
                            Parameter::Find { word: _ } => {
                                if rest.is_empty() {
                                    println!("usage: find <word>");
                                    continue;
                                }
                                Parameter::Find { word: rest }
                            }
                            Parameter::Prefix { word: _ } => {
                                if rest.is_empty() {
                                    println!("usage: prefix <word>");
                                    continue;
                                }
                                Parameter::Prefix { word: rest }
                            }
                            Parameter::Stemmed { word: _ } => {
                                if rest.is_empty() {
                                    println!("usage: stemmed <word>");
                                    continue;
                                }
                                Parameter::Stemmed { word: rest }
                            }
                            _ => p,
                        }
                    }
                    Err(e) => {
                        println!("error: {e}");
                        continue;
                    }
                };
                process_parameter(&dictionary, &parameter).await;
                rl.add_history_entry(line.as_str())?;
            }
            Err(ReadlineError::Interrupted) => {
                println!("terminating...");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("terminating...");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
    if let Some(file_location) = get_history_file() {
        if let Err(e) = rl.save_history(&file_location) {
            println!("error saving history: {e}");
        }
    }
    Ok(())
}

async fn process_parameter(dictionary: &BtreeDictionary, parameter: &Parameter) {
    match parameter {
        Parameter::Build { .. } => println!("build is not available interactively"),
        Parameter::Find { word } => match dictionary.find_articles(word).await {
            Ok(articles) => {
                if articles.is_empty() {
                    println!("not found");
                }
                for link in articles {
                    println!("{} @ {}", link.word, link.article_offset);
                }
            }
            Err(e) => println!("error: {e}"),
        },
        Parameter::Help => {
            let help = Cli::command().render_help().to_string();

            let mut print_it = false;

            for line in help.lines() {
                if line.starts_with("Arguments:") {
                    print_it = false;
                }
                if print_it && !line.is_empty() {
                    println!("{}", line);
                }
                if line.starts_with("Commands:") {
                    print_it = true;
                }
            }
        }
        Parameter::Info => match dictionary.index().chains().await {
            Ok(chains) => {
                let count = chains
                    .fold(0usize, |count, chain| async move {
                        count + chain.map(|c| c.len()).unwrap_or(0)
                    })
                    .await;
                println!("name: {}", dictionary.name());
                println!("entries: {count}");
            }
            Err(e) => println!("error: {e}"),
        },
        Parameter::Keys => match dictionary.index().chains().await {
            Ok(mut chains) => {
                while let Some(chain) = chains.next().await {
                    match chain {
                        Ok(links) => {
                            for link in links {
                                println!("{}{}", link.prefix, link.word);
                            }
                        }
                        Err(e) => {
                            println!("error: {e}");
                            break;
                        }
                    }
                }
            }
            Err(e) => println!("error: {e}"),
        },
        Parameter::Prefix { word } => {
            let mut request = dictionary.prefix_match(word, MAX_RESULTS);
            match request.matches().await {
                Ok(matches) => {
                    if matches.is_empty() {
                        println!("no matches");
                    }
                    for m in matches {
                        println!("{}", m.word);
                    }
                }
                Err(e) => println!("error: {e}"),
            }
        }
        Parameter::Stemmed { word } => {
            let mut request = dictionary.stemmed_match(
                word,
                STEM_MIN_LENGTH,
                STEM_SUFFIX_VARIATION,
                MAX_RESULTS,
            );
            match request.matches().await {
                Ok(matches) => {
                    if matches.is_empty() {
                        println!("no matches");
                    }
                    for m in matches {
                        println!("{}", m.word);
                    }
                }
                Err(e) => println!("error: {e}"),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match env::var("TMPDIR") {
        Ok(d) => d,
        Err(_e) => ".".to_string(),
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "lexitree.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt().with_writer(non_blocking).init();

    if let Some(Parameter::Build { words }) = &cli.parameter {
        return build(&cli.index, words).await;
    }

    let dictionary = BtreeDictionary::open(cli.index.clone(), &cli.index).await?;

    match cli.parameter {
        Some(parameter) => process_parameter(&dictionary, &parameter).await,
        None => interactive(dictionary).await?,
    }
    Ok(())
}

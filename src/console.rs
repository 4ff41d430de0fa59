use rustyline::history::MemHistory;
use rustyline::Editor;
use snafu::{ResultExt, Snafu};

use crate::interpreter::{Classifier, Interpreter};
use crate::model::CommandContext;
use crate::platform::VideoSource;
use crate::sink::ChatSink;
use crate::store::SubscriptionStore;

#[derive(Debug, Snafu)]
pub enum ConsoleError {
    #[snafu(display("failed to initialize the console: {source}"))]
    Readline {
        source: rustyline::error::ReadlineError,
    },
}

/// Operator console: every line is run through the command interpreter
/// against a context built from the chat transport's channel list, with the
/// guild's first channel standing in for the issuing channel. Exit with
/// `quit`, `exit` or end-of-input.
pub async fn run<S, V, C>(
    interpreter: &Interpreter<S, V, C>,
    chat: &ChatSink,
) -> Result<(), ConsoleError>
where
    S: SubscriptionStore,
    V: VideoSource,
    C: Classifier,
{
    let mut editor: Editor<(), MemHistory> =
        Editor::with_history(rustyline::Config::default(), MemHistory::new())
            .context(ReadlineSnafu)?;

    tracing::info!("console ready");

    loop {
        let Ok(line) = editor.readline("tanuki> ") else {
            break;
        };

        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if line == "quit" || line == "exit" {
            break;
        }

        editor.add_history_entry(&line).ok();

        let channels = match chat.channels().await {
            Ok(channels) => channels,
            Err(error) => {
                tracing::error!(%error, "could not list guild channels");
                continue;
            }
        };

        let Some(current) = channels.first().cloned() else {
            tracing::error!("the guild has no channels");
            continue;
        };

        let ctx = CommandContext::new(current, channels);
        let reply = interpreter.handle(&line, &ctx).await;
        println!("{reply}");
    }

    Ok(())
}

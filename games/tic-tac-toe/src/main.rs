mod adapter;
mod terminal;

use crate::adapter::{ClientPhase, ClientProtocolAdapter, ViewUpdate};
use crate::terminal::{Command, HELP, parse_command, render_board};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{DEFAULT_SERVER_ADDRESS, MAX_LINE_LENGTH, Request};
use tokio::io::Stdin;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, FramedRead, LinesCodec};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type ServerSink = SplitSink<Framed<TcpStream, LinesCodec>, String>;
type ServerStream = SplitStream<Framed<TcpStream, LinesCodec>>;

#[tokio::main]
/// Connects to the local server and runs the terminal loop until the game is over for this client.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let stream = match TcpStream::connect(DEFAULT_SERVER_ADDRESS).await {
        Ok(stream) => stream,
        Err(error) => {
            tracing::error!(address = DEFAULT_SERVER_ADDRESS, %error, "Could not connect to the server.");
            std::process::exit(1);
        }
    };

    let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (sender, receiver) = framed.split();
    let reason = run(sender, receiver).await;
    println!("{reason}");
}

/// The core loop. Server lines update the view, typed commands become requests.
async fn run(mut sender: ServerSink, mut receiver: ServerStream) -> &'static str {
    let mut adapter = ClientProtocolAdapter::new();
    let mut input = FramedRead::new(tokio::io::stdin(), LinesCodec::new());

    println!("{}", render_board(adapter.marks()));
    println!("Enter your player name with `name <your name>`. Type `help` for all commands.");

    loop {
        tokio::select! {
            line = receiver.next() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(error)) => {
                        tracing::warn!(?error, "Reading from the server failed.");
                        return "Connection to server lost.";
                    }
                    None => return "Connection to server lost.",
                };
                if let Some(update) = adapter.apply_line(&line) {
                    show(&adapter, update);
                }
                if adapter.is_finished() {
                    return "Good bye.";
                }
            }
            command = next_command(&mut input) => {
                let Some(command) = command else {
                    // Stdin closed, leave like a declined replay.
                    if let Err(error) = sender.send(Request::Leave.to_string()).await {
                        tracing::debug!(?error, "Could not send the leave request.");
                    }
                    return "Input closed.";
                };
                let Some(request) = translate(&mut adapter, command) else {
                    continue;
                };
                if let Err(error) = sender.send(request.to_string()).await {
                    tracing::warn!(?error, "Sending to the server failed.");
                    return "Connection to server lost.";
                }
                match request {
                    Request::Leave => return "Good bye.",
                    // Nobody seated would see our exit broadcast, so there is nothing to wait for.
                    Request::Exit if adapter.slot().is_none() => return "Good bye.",
                    _ => {}
                }
            }
        }
    }
}

/// Waits for the next typed line. Unreadable input lines are skipped.
async fn next_command(input: &mut FramedRead<Stdin, LinesCodec>) -> Option<Command> {
    loop {
        match input.next().await? {
            Ok(line) => match parse_command(&line) {
                Some(command) => return Some(command),
                None => println!("Unknown command. {HELP}"),
            },
            Err(error) => tracing::warn!(?error, "Unreadable input line."),
        }
    }
}

/// Applies a command to the adapter and explains why nothing is sent when the action does not fit.
fn translate(adapter: &mut ClientProtocolAdapter, command: Command) -> Option<Request> {
    let (request, refusal) = match command {
        Command::Name(name) => {
            let request = adapter.submit_name(&name);
            if let (Some(_), Some(name)) = (&request, adapter.name()) {
                println!("WELCOME {name}");
            }
            (request, "You already asked to join.")
        }
        Command::Press { row, col } => {
            if !adapter.input_enabled() {
                println!("It is not your turn to move.");
                return None;
            }
            (adapter.press(row, col), "Join the game first.")
        }
        Command::Answer(play_again) => (
            adapter.answer_replay(play_again),
            "There is no question to answer.",
        ),
        Command::Exit => (adapter.exit(), "Enter your player name first."),
        Command::Help => {
            println!("{HELP}");
            return None;
        }
    };
    if request.is_none() {
        println!("{refusal}");
    }
    request
}

fn show(adapter: &ClientProtocolAdapter, update: ViewUpdate) {
    if update.redraw {
        println!("{}", render_board(adapter.marks()));
        if adapter.phase() == ClientPhase::Playing {
            println!("{} to move.", adapter.to_move());
        }
    }
    if let Some(prompt) = update.prompt {
        println!("{prompt}");
    }
}

//! Terminal chat client for the conversation endpoint.

use clap::Parser;
use rag_chatbot::{
    telemetry,
    widget::{ChatController, ConversationTransport, HttpTransport, Message, Role},
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "rag-chat", about = "Chat with a running RAG chatbot server")]
struct Args {
    /// Base URL of the server.
    #[arg(long, default_value = "http://localhost:8000")]
    server: String,

    /// Log filter for client diagnostics.
    #[arg(long, default_value = "warn")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(&args.log);

    let transport = HttpTransport::new(&args.server);
    println!("Connected to {} (type /quit to exit)", transport.url());
    let mut controller = ChatController::new(transport);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/quit" | "/exit" => break,
            "/history" => {
                println!("{} turn(s) in this session", controller.session().history().len());
                continue;
            }
            _ => {}
        }

        let Some(pending) = controller.begin_submit(&line) else {
            continue;
        };
        if controller.session().typing_indicator() {
            println!("...");
        }
        let outcome = controller.transport().send(pending.request()).await;
        controller.complete(pending, outcome);

        if let Some(message) = controller.session().transcript().last() {
            print_message(message);
        }
    }
    Ok(())
}

fn print_message(message: &Message) {
    match message.role {
        Role::Ai => println!("\n{}\n", message.content),
        Role::System => eprintln!("! {}", message.content),
        Role::User => {}
    }
}

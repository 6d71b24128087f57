//! Line-oriented console
//!
//! Lines starting with `/` are commands; anything else is sent to the contact
//! of the open conversation.

use anyhow::{anyhow, bail, Result};
use informer_protocol::{parse_port, PersonId, ProtocolError, SyncEngine};
use std::str::FromStr;
use tracing::warn;

pub const HELP: &str = "\
Commands:
  /contacts         list known contacts
  /open <number>    open the conversation with a contact
  /listen <port>    listen for the phone on another port
  /restart          drop the connection and listen again
  /stop             stop listening
  /help             show this help
  /quit             exit
Any other line is sent to the open conversation.";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Contacts,
    Open(String),
    Listen(u16),
    Restart,
    Stop,
    Help,
    Quit,
    Send(String),
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            bail!("empty line");
        }

        let Some(command) = line.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match name {
            "contacts" => Ok(Command::Contacts),
            "open" if !arg.is_empty() => Ok(Command::Open(arg.to_string())),
            "open" => bail!("usage: /open <number>"),
            "listen" => Ok(Command::Listen(parse_port(arg)?)),
            "restart" => Ok(Command::Restart),
            "stop" => Ok(Command::Stop),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(anyhow!("unknown command /{}", other)),
        }
    }
}

/// Whether the console keeps reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Run one command against the engine
pub async fn execute(engine: &SyncEngine, command: Command) -> Result<Flow> {
    let coordinator = engine.coordinator();

    match command {
        Command::Contacts => {
            let contacts = coordinator.contacts().await;
            if contacts.is_empty() {
                println!("No contacts yet");
            }
            for person in contacts {
                println!("{}", person);
            }
        }
        Command::Open(number) => {
            let person = PersonId::new(number, "");
            if coordinator.conversation(&person).await.is_none() {
                println!("No conversation with {}", person);
            } else {
                coordinator.load_conversation(&person).await?;
            }
        }
        Command::Listen(port) => {
            engine.start(port).await?;
        }
        Command::Restart => {
            engine.stop_all_work(true).await?;
        }
        Command::Stop => {
            engine.stop_services().await?;
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(Flow::Quit),
        Command::Send(text) => match coordinator.send_message(text).await {
            Ok(()) => {}
            Err(e @ ProtocolError::NoActiveConversation)
            | Err(e @ ProtocolError::NoActiveConnection) => {
                println!("{}", e.user_message());
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(Flow::Continue)
}

/// Parse and run one line; failures are reported, never fatal
pub async fn handle_line(engine: &SyncEngine, line: &str) -> Flow {
    if line.trim().is_empty() {
        return Flow::Continue;
    }

    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            println!("{}", e);
            return Flow::Continue;
        }
    };

    match execute(engine, command).await {
        Ok(flow) => flow,
        Err(e) => {
            warn!("Command failed: {:#}", e);
            Flow::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use informer_protocol::{Conversation, ListenerConfig, Message};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    #[test]
    fn test_parse_commands() {
        assert_eq!("/contacts".parse::<Command>().unwrap(), Command::Contacts);
        assert_eq!(
            "/open +48111".parse::<Command>().unwrap(),
            Command::Open("+48111".into())
        );
        assert_eq!(
            " /listen 9000 ".parse::<Command>().unwrap(),
            Command::Listen(9000)
        );
        assert_eq!("/restart".parse::<Command>().unwrap(), Command::Restart);
        assert_eq!("/stop".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!("/exit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!(
            "see you at 5".parse::<Command>().unwrap(),
            Command::Send("see you at 5".into())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<Command>().is_err());
        assert!("/open".parse::<Command>().is_err());
        assert!("/listen 0".parse::<Command>().is_err());
        assert!("/listen".parse::<Command>().is_err());
        assert!("/dance".parse::<Command>().is_err());
    }

    fn engine() -> SyncEngine {
        SyncEngine::new(ListenerConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        })
    }

    #[tokio::test]
    async fn test_open_selects_conversation() {
        let engine = engine();
        let coordinator = engine.coordinator();
        coordinator
            .attach_observer(Arc::new(crate::observer::LogObserver))
            .await;
        coordinator
            .on_snapshot_received(vec![Conversation::with_messages(
                PersonId::new("+48111", "Alice"),
                vec![Message::received("hello", 1)],
            )])
            .await
            .unwrap();

        let flow = handle_line(&engine, "/open +48111").await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            coordinator.current_conversation().await,
            Some(PersonId::new("+48111", "Alice"))
        );
    }

    #[tokio::test]
    async fn test_send_without_conversation_is_not_fatal() {
        let engine = engine();
        assert_eq!(handle_line(&engine, "hello?").await, Flow::Continue);
        assert_eq!(handle_line(&engine, "/nope").await, Flow::Continue);
        assert_eq!(handle_line(&engine, "/quit").await, Flow::Quit);
    }
}

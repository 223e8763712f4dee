use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use courier_db::Database;
use courier_db::models::MessageRow;
use courier_types::events::{GatewayCommand, GatewayEvent};
use courier_types::models::MessageKind;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Identity of an authenticated gateway connection. The JWT was already
/// validated at the HTTP upgrade layer and the user row fetched, so the
/// loop never touches token material.
#[derive(Debug, Clone)]
pub struct ConnectedUser {
    pub id: i64,
    pub name: String,
}

pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user: ConnectedUser,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", user.name, user.id);

    let ready = GatewayEvent::Ready {
        user_id: user.id,
        name: user.name.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Join the user's logical broadcast group
    let (conn_id, reply_tx, mut user_rx) = dispatcher.register(user.id).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client
    let dispatcher_recv = dispatcher.clone();
    let user_recv = user.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, &db, &user_recv, &reply_tx, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            user_recv.name,
                            user_recv.id,
                            e,
                            truncate_for_log(&text)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister(user.id, conn_id).await;
    info!("{} ({}) disconnected from gateway", user.name, user.id);
}

enum SendOutcome {
    ChatNotFound,
    NotAMember,
    Delivered { row: MessageRow, members: Vec<i64> },
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user: &ConnectedUser,
    reply_tx: &UnboundedSender<GatewayEvent>,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::SendMessage {
            chat_id,
            kind,
            content,
        } => {
            send_message(dispatcher, db, user, reply_tx, chat_id, kind, content).await;
        }

        GatewayCommand::StartTyping { chat_id } => {
            start_typing(dispatcher, db, user, chat_id).await;
        }
    }
}

/// The fan-out path: persist the message, then push it to every current
/// member of the chat. Membership is looked up at send time; members with
/// no live connection are skipped silently.
async fn send_message(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user: &ConnectedUser,
    reply_tx: &UnboundedSender<GatewayEvent>,
    chat_id: i64,
    kind: MessageKind,
    content: String,
) {
    if content.trim().is_empty() {
        reply(reply_tx, "empty-content", "message content must not be empty");
        return;
    }

    // Validation, insert and membership lookup run as one blocking unit:
    // the inserted row (id, timestamp) is captured before fan-out starts.
    let db = db.clone();
    let sender_id = user.id;
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<SendOutcome> {
        if !db.group_exists(chat_id)? {
            return Ok(SendOutcome::ChatNotFound);
        }
        if !db.is_member(chat_id, sender_id)? {
            return Ok(SendOutcome::NotAMember);
        }
        let row = db.insert_message(chat_id, sender_id, kind.as_str(), &content)?;
        let members = db.member_ids(chat_id)?;
        Ok(SendOutcome::Delivered { row, members })
    })
    .await;

    let outcome = match outcome {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!("send_message persistence error: {}", e);
            reply(reply_tx, "internal", "failed to store message");
            return;
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            reply(reply_tx, "internal", "failed to store message");
            return;
        }
    };

    match outcome {
        SendOutcome::ChatNotFound => {
            reply(
                reply_tx,
                "chat-not-found",
                &format!("chat {} does not exist", chat_id),
            );
        }
        SendOutcome::NotAMember => {
            warn!(
                "{} ({}) tried to post to chat {} without membership",
                user.name, user.id, chat_id
            );
            reply(
                reply_tx,
                "not-a-member",
                &format!("you are not a member of chat {}", chat_id),
            );
        }
        SendOutcome::Delivered { row, members } => {
            let message = row.into_response();
            for member_id in members {
                dispatcher
                    .send_to_user(
                        member_id,
                        GatewayEvent::NewMessage {
                            message: message.clone(),
                        },
                    )
                    .await;
            }
        }
    }
}

async fn start_typing(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user: &ConnectedUser,
    chat_id: i64,
) {
    let db = db.clone();
    let sender_id = user.id;
    let members = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Vec<i64>>> {
        if !db.is_member(chat_id, sender_id)? {
            return Ok(None);
        }
        Ok(Some(db.member_ids(chat_id)?))
    })
    .await;

    let members = match members {
        Ok(Ok(Some(members))) => members,
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            error!("start_typing lookup error: {}", e);
            return;
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            return;
        }
    };

    for member_id in members {
        if member_id == user.id {
            continue;
        }
        dispatcher
            .send_to_user(
                member_id,
                GatewayEvent::Typing {
                    chat_id,
                    user_id: user.id,
                    name: user.name.clone(),
                },
            )
            .await;
    }
}

fn reply(reply_tx: &UnboundedSender<GatewayEvent>, code: &str, message: &str) {
    let _ = reply_tx.send(GatewayEvent::Error {
        code: code.to_string(),
        message: message.to_string(),
    });
}

const MAX_LOGGED_COMMAND_CHARS: usize = 200;

/// Clamp an unparseable frame for logging. Cuts on a character boundary so
/// multi-byte UTF-8 content can never panic the slice.
fn truncate_for_log(text: &str) -> &str {
    match text.char_indices().nth(MAX_LOGGED_COMMAND_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// In-memory database with one two-member chat and one outsider.
    /// Returns (db, chat_id, sender_id, member_id, outsider_id).
    fn chat_fixture() -> (Arc<Database>, i64, i64, i64, i64) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let sender = db.create_user("1000", "Sender", "$argon2id$stub", false).unwrap();
        let member = db.create_user("1001", "Member", "$argon2id$stub", false).unwrap();
        let outsider = db.create_user("1002", "Outsider", "$argon2id$stub", false).unwrap();
        let chat = db
            .create_group_with_members("team", None, sender, &[member])
            .unwrap();
        (db, chat, sender, member, outsider)
    }

    fn connected(id: i64, name: &str) -> ConnectedUser {
        ConnectedUser {
            id,
            name: name.into(),
        }
    }

    fn recv_new_message(
        rx: &mut mpsc::UnboundedReceiver<GatewayEvent>,
    ) -> courier_types::api::MessageResponse {
        match rx.try_recv() {
            Ok(GatewayEvent::NewMessage { message }) => message,
            other => panic!("expected new_message event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fanout_reaches_each_member_exactly_once() {
        let (db, chat, sender_id, member_id, outsider_id) = chat_fixture();
        let dispatcher = Dispatcher::new();

        let (_sc, _st, mut sender_rx) = dispatcher.register(sender_id).await;
        let (_mc, _mt, mut member_rx) = dispatcher.register(member_id).await;
        let (_oc, _ot, mut outsider_rx) = dispatcher.register(outsider_id).await;
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        send_message(
            &dispatcher,
            &db,
            &connected(sender_id, "Sender"),
            &reply_tx,
            chat,
            MessageKind::Text,
            "hi".into(),
        )
        .await;

        // Each current member gets exactly one push, sender included
        for rx in [&mut sender_rx, &mut member_rx] {
            let message = recv_new_message(rx);
            assert_eq!(message.chat_id, chat);
            assert_eq!(message.sender_id, sender_id);
            assert_eq!(message.content, "hi");
            assert!(rx.try_recv().is_err());
        }

        // Non-members get nothing, and no error was raised
        assert!(outsider_rx.try_recv().is_err());
        assert!(reply_rx.try_recv().is_err());

        assert_eq!(db.messages_for_chat(chat).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_member_send_rejected_and_not_persisted() {
        let (db, chat, sender_id, member_id, outsider_id) = chat_fixture();
        let dispatcher = Dispatcher::new();

        let (_sc, _st, mut sender_rx) = dispatcher.register(sender_id).await;
        let (_mc, _mt, mut member_rx) = dispatcher.register(member_id).await;
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        send_message(
            &dispatcher,
            &db,
            &connected(outsider_id, "Outsider"),
            &reply_tx,
            chat,
            MessageKind::Text,
            "let me in".into(),
        )
        .await;

        match reply_rx.try_recv() {
            Ok(GatewayEvent::Error { code, .. }) => assert_eq!(code, "not-a-member"),
            other => panic!("expected error event, got {:?}", other),
        }

        // Nothing persisted, nothing delivered
        assert!(db.messages_for_chat(chat).unwrap().is_empty());
        assert!(sender_rx.try_recv().is_err());
        assert!(member_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unknown_chat_reports_chat_not_found() {
        let (db, _chat, sender_id, _member_id, _outsider_id) = chat_fixture();
        let dispatcher = Dispatcher::new();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        send_message(
            &dispatcher,
            &db,
            &connected(sender_id, "Sender"),
            &reply_tx,
            999,
            MessageKind::Text,
            "hello?".into(),
        )
        .await;

        match reply_rx.try_recv() {
            Ok(GatewayEvent::Error { code, .. }) => assert_eq!(code, "chat-not-found"),
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[test]
    fn test_truncate_for_log_cuts_on_char_boundary() {
        let short = "hello";
        assert_eq!(truncate_for_log(short), short);

        // 300 three-byte characters: a raw byte slice at 200 would land
        // mid-character and panic
        let long = "\u{65e5}".repeat(300);
        let cut = truncate_for_log(&long);
        assert_eq!(cut.chars().count(), MAX_LOGGED_COMMAND_CHARS);
        assert!(long.starts_with(cut));
    }
}

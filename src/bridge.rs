use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tungstenite::{connect, Message};

use crate::{
    build_http_agent, slack_api_post_json, BotConfig, GeminiClient, MapError, NameCache, Pipeline,
    SlackClient, SlackSearchClient, TriggerEvent,
};

const SEEN_EVENT_CAP: usize = 512;

#[derive(Debug)]
enum SocketFrame {
    Event {
        envelope_id: Option<String>,
        payload: serde_json::Value,
    },
    Disconnected(String),
}

fn is_duplicate_event(seen: &mut VecDeque<String>, event_id: &str) -> bool {
    if seen.iter().any(|item| item == event_id) {
        return true;
    }
    seen.push_back(event_id.to_string());
    while seen.len() > SEEN_EVENT_CAP {
        let _ = seen.pop_front();
    }
    false
}

fn open_socket_url(agent: &ureq::Agent, app_token: &str) -> Result<String, MapError> {
    let response = slack_api_post_json(
        agent,
        app_token,
        "apps.connections.open",
        &serde_json::json!({}),
    )?;

    response
        .get("url")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or_else(|| {
            MapError::Slack("missing websocket url in apps.connections.open response".to_string())
        })
}

/// Socket Mode wraps Events API payloads; interactive frames carry the
/// payload as a JSON string instead of an object.
fn normalize_payload(raw: &serde_json::Value) -> Option<serde_json::Value> {
    let payload = raw.get("payload").unwrap_or(raw);
    if let Some(payload_str) = payload.as_str() {
        serde_json::from_str::<serde_json::Value>(payload_str).ok()
    } else if payload.is_object() {
        Some(payload.clone())
    } else {
        None
    }
}

fn strip_bot_mentions(text: &str, bot_user_id: &Option<String>) -> String {
    let Some(bot_user_id) = bot_user_id.as_ref() else {
        return text.trim().to_string();
    };

    let mut clean = text.replace(&format!("<@{bot_user_id}>"), "");

    let mention_start = format!("<@{bot_user_id}|");
    loop {
        let Some(start) = clean.find(&mention_start) else {
            break;
        };
        let remainder = &clean[start + mention_start.len()..];
        let Some(close) = remainder.find('>') else {
            break;
        };
        let end = start + mention_start.len() + close + 1;
        clean.replace_range(start..end, "");
    }

    clean.trim().to_string()
}

fn parse_reaction_event(event: &serde_json::Value, trigger_emoji: &str) -> Option<TriggerEvent> {
    let reaction = event.get("reaction").and_then(|v| v.as_str())?;
    if reaction != trigger_emoji {
        return None;
    }

    let item = event.get("item")?;
    if item.get("type").and_then(|v| v.as_str()) != Some("message") {
        return None;
    }

    Some(TriggerEvent {
        channel_id: item
            .get("channel")
            .and_then(|v| v.as_str())?
            .to_string(),
        message_ts: item.get("ts").and_then(|v| v.as_str())?.to_string(),
        actor_user_id: event
            .get("user")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        prefilled_text: None,
    })
}

fn parse_mention_event(
    event: &serde_json::Value,
    bot_user_id: &Option<String>,
) -> Option<TriggerEvent> {
    // Ignore other bots to avoid mention loops.
    if event.get("bot_id").is_some() {
        return None;
    }

    let text = event.get("text").and_then(|v| v.as_str()).unwrap_or("");
    Some(TriggerEvent {
        channel_id: event
            .get("channel")
            .and_then(|v| v.as_str())?
            .to_string(),
        message_ts: event.get("ts").and_then(|v| v.as_str())?.to_string(),
        actor_user_id: event
            .get("user")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        prefilled_text: Some(strip_bot_mentions(text, bot_user_id)),
    })
}

fn parse_trigger(
    payload: &serde_json::Value,
    trigger_emoji: &str,
    bot_user_id: &Option<String>,
) -> Option<TriggerEvent> {
    let event = payload.get("event")?;
    match event.get("type").and_then(|v| v.as_str())? {
        "reaction_added" => parse_reaction_event(event, trigger_emoji),
        "app_mention" => parse_mention_event(event, bot_user_id),
        _ => None,
    }
}

fn ack_envelope(
    socket: &mut tungstenite::WebSocket<tungstenite::stream::MaybeTlsStream<std::net::TcpStream>>,
    payload: &serde_json::Value,
) -> Option<String> {
    let envelope_id = payload
        .get("envelope_id")
        .and_then(|v| v.as_str())
        .map(ToString::to_string);

    if let Some(ref eid) = envelope_id {
        let ack = serde_json::json!({
            "envelope_id": eid,
            "payload": serde_json::json!({}),
        });
        let _ = socket.send(Message::Text(ack.to_string().into()));
    }

    envelope_id
}

fn spawn_socket_listener(ws_url: String, tx: mpsc::Sender<SocketFrame>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut socket = match connect(&ws_url) {
            Ok((socket, _)) => socket,
            Err(err) => {
                let _ = tx.send(SocketFrame::Disconnected(format!("connect error: {err}")));
                return;
            }
        };

        loop {
            let message = match socket.read() {
                Ok(message) => message,
                Err(err) => {
                    let _ = tx.send(SocketFrame::Disconnected(format!("read error: {err}")));
                    break;
                }
            };

            let text = match message {
                Message::Text(text) => text.to_string(),
                Message::Binary(binary) => match String::from_utf8(binary.into()) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Message::Ping(payload) => {
                    let _ = socket.send(Message::Pong(payload));
                    continue;
                }
                Message::Pong(_) => continue,
                Message::Close(frame) => {
                    let reason = frame
                        .map(|frame| frame.reason.to_string())
                        .unwrap_or_else(|| "socket closed".to_string());
                    let _ = tx.send(SocketFrame::Disconnected(format!("close: {reason}")));
                    break;
                }
                _ => continue,
            };

            let payload = match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => value,
                Err(err) => {
                    eprintln!("[bridge] socket payload parse error: {err}");
                    continue;
                }
            };

            let envelope_id = ack_envelope(&mut socket, &payload);
            if tx
                .send(SocketFrame::Event {
                    envelope_id,
                    payload,
                })
                .is_err()
            {
                break;
            }
        }
    })
}

fn spawn_trigger_worker(
    event: TriggerEvent,
    transport: Arc<SlackClient>,
    search: Arc<SlackSearchClient>,
    model: Arc<GeminiClient>,
    names: Arc<NameCache>,
    bot_user_id: Option<String>,
    max_results: usize,
    include_files: bool,
) {
    thread::spawn(move || {
        let channel_id = event.channel_id.clone();
        let message_ts = event.message_ts.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let pipeline = Pipeline {
                transport: transport.as_ref(),
                search: search.as_ref(),
                model: model.as_ref(),
                names: names.as_ref(),
                bot_user_id,
                max_results,
                include_files,
            };
            pipeline.handle_trigger(&event);
        }));

        if result.is_err() {
            eprintln!("[bridge] trigger handler panicked for {channel_id}/{message_ts}");
            let _ = crate::Transport::post_text(
                transport.as_ref(),
                &channel_id,
                Some(&message_ts),
                "Something went wrong building the map. Please try again.",
            );
        }
    });
}

/// Socket Mode event loop: connect, ack envelopes, fan each trigger out to
/// its own worker thread, reconnect with capped backoff on any drop.
pub(crate) fn run_bridge(config: BotConfig) -> Result<(), MapError> {
    let agent = build_http_agent(config.http_timeout_ms);

    let transport = Arc::new(SlackClient::new(agent.clone(), config.bot_token.clone()));
    let search = Arc::new(SlackSearchClient::new(
        agent.clone(),
        config.user_token.clone(),
    ));
    let model = Arc::new(GeminiClient::from_env(config.http_timeout_ms)?);
    let names = Arc::new(NameCache::new());

    let bot_user_id = transport.bot_user_id();
    match &bot_user_id {
        Some(id) => eprintln!("[bridge] connected as bot user {id}"),
        None => eprintln!("[bridge] auth.test did not return a bot user id; self-trigger filtering disabled"),
    }

    let mut reconnect_delay = Duration::from_secs(1);
    let max_reconnect_delay = Duration::from_secs(30);

    eprintln!(
        "[bridge] starting Socket Mode loop (trigger emoji :{}:)",
        config.trigger_emoji
    );

    loop {
        let ws_url = match open_socket_url(&agent, &config.app_token) {
            Ok(url) => url,
            Err(err) => {
                eprintln!("[bridge] apps.connections.open failed: {err}");
                thread::sleep(reconnect_delay);
                reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
                continue;
            }
        };

        let (socket_tx, socket_rx) = mpsc::channel::<SocketFrame>();
        let _listener = spawn_socket_listener(ws_url, socket_tx);
        let mut seen_events = VecDeque::new();
        reconnect_delay = Duration::from_secs(1);

        eprintln!("[bridge] connected to Socket Mode");

        loop {
            match socket_rx.recv_timeout(Duration::from_millis(250)) {
                Ok(SocketFrame::Event {
                    envelope_id,
                    payload,
                }) => {
                    let event_id = payload
                        .get("payload")
                        .and_then(|p| p.get("event_id"))
                        .and_then(|v| v.as_str())
                        .or_else(|| payload.get("event_id").and_then(|v| v.as_str()))
                        .or(envelope_id.as_deref())
                        .unwrap_or("");
                    if !event_id.is_empty() && is_duplicate_event(&mut seen_events, event_id) {
                        continue;
                    }

                    let Some(normalized) = normalize_payload(&payload) else {
                        continue;
                    };
                    if let Some(trigger) =
                        parse_trigger(&normalized, &config.trigger_emoji, &bot_user_id)
                    {
                        spawn_trigger_worker(
                            trigger,
                            Arc::clone(&transport),
                            Arc::clone(&search),
                            Arc::clone(&model),
                            Arc::clone(&names),
                            bot_user_id.clone(),
                            config.max_results,
                            config.include_files,
                        );
                    }
                }
                Ok(SocketFrame::Disconnected(reason)) => {
                    eprintln!("[bridge] websocket disconnected: {reason}");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        thread::sleep(reconnect_delay);
        reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `gpiocast watch` command - Print events from a running service.

use gpiocast_core::{ClientNotice, SubscriberClient};
use tokio::sync::mpsc;

use super::load_config;

pub async fn execute(
    config_path: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?.client;
    tracing::info!(shm = %config.endpoint.shm_name, "Connecting to broadcast service");

    let mut client = SubscriberClient::create(config)?;
    client.connect()?;

    // The listener runs on its own thread; forward notices into the runtime
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe(move |notice| {
        let _ = tx.send(notice);
    })?;

    if !json {
        if let Some(path) = client.notify_socket_path() {
            println!("Subscribed ({}). Press Ctrl+C to stop...", path);
        }
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            notice = rx.recv() => {
                let Some(notice) = notice else { break };
                if json {
                    println!("{}", serde_json::to_string(&notice)?);
                } else {
                    print_notice(&notice);
                }
                if notice == ClientNotice::ServiceLost {
                    break;
                }
            }
        }
    }

    client.disconnect()?;
    client.destroy()?;
    Ok(())
}

fn print_notice(notice: &ClientNotice) {
    println!("{}", notice_line(notice));
}

fn notice_line(notice: &ClientNotice) -> String {
    match notice {
        ClientNotice::Event(event) => event.to_string(),
        ClientNotice::Resync { lost } => format!("! Missed {} events", lost),
        ClientNotice::ServiceLost => "✗ Broadcast service lost".to_string(),
        ClientNotice::ServiceRestored { write_index } => {
            format!("✓ Broadcast service restored at {}", write_index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpiocast_core::event::EventDraft;
    use gpiocast_core::{EventKind, Sequence};

    #[test]
    fn test_release_line_shows_duration_once() {
        let event = EventDraft::new(EventKind::Release, 75, 1_000)
            .with_press_duration(120)
            .into_event(Sequence::new(4));
        let line = notice_line(&ClientNotice::Event(event));
        assert_eq!(line.matches("120ms").count(), 1);
        assert_eq!(line, event.to_string());
    }

    #[test]
    fn test_error_line_shows_code_once() {
        let event = EventDraft::new(EventKind::Error, 75, 1_000)
            .with_error_code(5)
            .into_event(Sequence::new(0));
        let line = notice_line(&ClientNotice::Event(event));
        assert_eq!(line, event.to_string());
        assert!(!line.contains("errno"));
    }
}

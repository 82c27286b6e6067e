//! Assistant integration tests
//!
//! Full command flows against scripted audio and recording collaborators.
//! Time is paused, so multi-second recordings complete instantly.

use std::time::Duration;

use serde_json::{Value, json};
use voice_command_engine::Status;
use voice_command_engine::assistant::{HealthWatchdog, phrases};
use voice_command_engine::voice::RecordingMode;

mod common;
use common::{Harness, Script, push_to_talk_settings, wait_until, wake_word_settings};

const COMMAND: Script = Script::Utterance {
    lead_ms: 600,
    speech_ms: 1000,
};

const REPLY: Script = Script::Utterance {
    lead_ms: 300,
    speech_ms: 600,
};

const WAKE: Script = Script::Wake { after_ms: 200 };

fn send_message_to(name: &str, conversation_id: &str, content: &str) -> Value {
    json!({
        "transcript": format!("nhắn cho {name} là {content}"),
        "response": format!("Bạn muốn gửi \"{content}\" cho {name} phải không?"),
        "needsConfirmation": true,
        "pending": {
            "type": "send_message",
            "conversationId": conversation_id,
            "targetName": name,
            "content": content,
            "prompt": format!("Gửi \"{content}\" cho {name}?")
        }
    })
}

fn reply(transcript: &str) -> Value {
    json!({ "transcript": transcript, "pending": null })
}

#[tokio::test(start_paused = true)]
async fn test_wake_word_confirm_and_send() {
    let harness = Harness::new([WAKE, COMMAND, REPLY]);
    harness.transport.respond(send_message_to("Alice", "c-1", "hello"));
    harness.transport.respond(reply("có"));
    let (assistant, handle, status) = harness.assistant(wake_word_settings());

    let driver = async {
        wait_until(|| !harness.chat.calls().is_empty()).await;
        wait_until(|| *status.borrow() == Status::Listening).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert_eq!(harness.chat.calls(), vec!["message c-1 hello"]);

    let spoken = harness.speech.spoken();
    assert_eq!(spoken[0], "Bạn muốn gửi \"hello\" cho Alice phải không?");
    assert_eq!(spoken.last().unwrap(), &phrases::message_sent("Alice"));

    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].mode, RecordingMode::FreshCommand);
    assert!(requests[0].pending.is_none());
    assert_eq!(requests[1].mode, RecordingMode::ConfirmationReply);
    assert_eq!(
        requests[1].pending.as_ref().map(|p| p.kind()),
        Some("send_message")
    );

    assert_eq!(harness.mic.max_active(), 1, "listener and recorder never overlap");
    assert_eq!(*status.borrow(), Status::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_push_to_talk_while_busy_is_ignored() {
    let harness = Harness::new([COMMAND, COMMAND]);
    harness.transport.respond(json!({ "transcript": "xin chào", "response": "Chào bạn" }));
    let (assistant, handle, status) = harness.assistant(push_to_talk_settings());

    let driver = async {
        handle.push_to_talk();
        handle.push_to_talk();
        wait_until(|| harness.speech.spoken().contains(&"Chào bạn".to_string())).await;
        wait_until(|| *status.borrow() == Status::Idle).await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert_eq!(harness.mic.opens(), 1);
    assert_eq!(harness.transport.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_reply_recording() {
    let harness = Harness::new([WAKE, COMMAND]);
    harness.transport.respond(send_message_to("Alice", "c-1", "hello"));
    let (assistant, handle, status) = harness.assistant(wake_word_settings());

    let driver = async {
        // Listener, command, then the (silent) reply session
        wait_until(|| harness.mic.opens() == 3 && *status.borrow() == Status::Recording).await;
        handle.reset();
        wait_until(|| *status.borrow() == Status::Listening).await;
        wait_until(|| harness.transport.clears() == 1).await;
        assert_eq!(harness.mic.active(), 1, "only the listener holds the microphone");

        // The abandoned reply session never uploads or reopens anything
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(harness.transport.requests().len(), 1);
        assert_eq!(harness.mic.opens(), 4);
        assert!(harness.chat.calls().is_empty());

        harness.mic.push(COMMAND);
        handle.push_to_talk();
        wait_until(|| harness.transport.requests().len() == 2).await;
        wait_until(|| *status.borrow() == Status::Listening).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    let requests = harness.transport.requests();
    assert_eq!(requests[1].mode, RecordingMode::FreshCommand);
    assert!(requests[1].pending.is_none(), "reset discarded the pending action");
}

#[tokio::test(start_paused = true)]
async fn test_reset_does_not_wait_for_a_slow_clear() {
    let harness = Harness::new([WAKE, COMMAND]);
    harness.transport.respond(send_message_to("Alice", "c-1", "hello"));
    harness.transport.hang_clears();
    let (assistant, handle, status) = harness.assistant(wake_word_settings());

    let driver = async {
        wait_until(|| harness.mic.opens() == 3 && *status.borrow() == Status::Recording).await;
        handle.reset();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*status.borrow(), Status::Listening);
        assert_eq!(harness.mic.active(), 1, "listener is back while the clear is outstanding");
        assert_eq!(harness.transport.clears(), 1);

        // Control is serviced while the clear hangs
        harness.mic.push(COMMAND);
        handle.push_to_talk();
        wait_until(|| harness.transport.requests().len() == 2).await;
        assert!(harness.transport.requests()[1].pending.is_none());
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert_eq!(harness.mic.max_active(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wake_word_during_a_command_is_ignored() {
    // The second burst lands while the first command is still recording
    let harness = Harness::new([Script::DoubleWake { after_ms: 200, gap_ms: 600 }, COMMAND]);
    harness.transport.respond_after(
        Duration::from_secs(1),
        json!({ "transcript": "xin chào", "response": "Chào bạn" }),
    );
    let (assistant, handle, status) = harness.assistant(wake_word_settings());

    let driver = async {
        wait_until(|| harness.speech.spoken().contains(&"Chào bạn".to_string())).await;
        wait_until(|| *status.borrow() == Status::Listening).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    // Listener, one recorder, then the restarted listener
    assert_eq!(harness.mic.opens(), 3);
    assert_eq!(harness.transport.requests().len(), 1);
    assert_eq!(harness.speech.spoken(), vec!["Chào bạn"]);
    assert_eq!(harness.mic.max_active(), 1, "listener and recorder never overlap");
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_restarts_a_stalled_listener() {
    let harness = Harness::new([Script::Stall { after_ms: 500 }]);
    let (assistant, handle, status) = harness.assistant(wake_word_settings());
    let assistant = assistant.with_watchdog(HealthWatchdog::new(
        Duration::from_secs(1),
        Duration::from_secs(2),
    ));

    let driver = async {
        wait_until(|| *status.borrow() == Status::Listening).await;
        assert_eq!(harness.mic.opens(), 1);

        wait_until(|| harness.mic.opens() == 2).await;
        assert_eq!(*status.borrow(), Status::Listening);
        assert_eq!(harness.mic.active(), 1, "the stalled stream was released");

        // The replacement stream keeps delivering, so no further restarts
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(harness.mic.opens(), 2);
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert!(harness.transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_new_pending_action_replaces_the_old_one() {
    let harness = Harness::new([COMMAND, REPLY, REPLY]);
    harness.transport.respond(send_message_to("Alice", "c-1", "hello"));
    harness.transport.respond(send_message_to("Bob", "c-2", "hi"));
    harness.transport.respond(reply("đúng rồi"));
    let (assistant, handle, status) = harness.assistant(push_to_talk_settings());

    let driver = async {
        handle.push_to_talk();
        wait_until(|| !harness.chat.calls().is_empty()).await;
        wait_until(|| *status.borrow() == Status::Idle).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert_eq!(harness.chat.calls(), vec!["message c-2 hi"]);
    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 3);
    let sent_pending = requests[2].pending.as_ref().unwrap();
    assert_eq!(sent_pending.target.target_name.as_deref(), Some("Bob"));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_incoming_call_is_declined() {
    let harness = Harness::new([REPLY]);
    harness.transport.respond(reply("không"));
    let (assistant, handle, status) = harness.assistant(push_to_talk_settings());

    let driver = async {
        handle.incoming_call("call-1", "Mẹ", false);
        wait_until(|| !harness.chat.calls().is_empty()).await;
        wait_until(|| *status.borrow() == Status::Idle).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert_eq!(harness.chat.calls(), vec!["answer call-1 accept=false"]);
    let spoken = harness.speech.spoken();
    assert_eq!(spoken[0], phrases::incoming_call_prompt("Mẹ", false));
    assert_eq!(spoken.last().unwrap(), &phrases::call_declined("Mẹ"));

    let requests = harness.transport.requests();
    assert_eq!(requests[0].mode, RecordingMode::ConfirmationReply);
    assert_eq!(requests[0].pending.as_ref().map(|p| p.kind()), Some("incoming_call"));
}

#[tokio::test(start_paused = true)]
async fn test_stops_waiting_after_three_silent_replies() {
    let harness = Harness::new([COMMAND]);
    harness.transport.respond(send_message_to("Alice", "c-1", "hello"));
    let (assistant, handle, status) = harness.assistant(push_to_talk_settings());

    let driver = async {
        handle.push_to_talk();
        wait_until(|| harness.speech.spoken().contains(&phrases::STOP_WAITING.to_string())).await;
        wait_until(|| matches!(*status.borrow(), Status::AwaitingReply(_))).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    // One command plus three reply sessions; silent sessions are never uploaded
    assert_eq!(harness.mic.opens(), 4);
    assert_eq!(harness.transport.requests().len(), 1);
    assert!(harness.chat.calls().is_empty());

    let reprompts = harness
        .speech
        .spoken()
        .iter()
        .filter(|s| s.starts_with(phrases::REPLY_NOT_HEARD))
        .count();
    assert_eq!(reprompts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_silent_command_is_not_uploaded() {
    let harness = Harness::new([Script::Silence]);
    let (assistant, handle, status) = harness.assistant(push_to_talk_settings());

    let driver = async {
        handle.push_to_talk();
        wait_until(|| harness.speech.spoken().contains(&phrases::NOT_HEARD.to_string())).await;
        wait_until(|| *status.borrow() == Status::Idle).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert!(harness.transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_service_is_reported() {
    let harness = Harness::new([COMMAND]);
    for _ in 0..4 {
        harness
            .transport
            .fail(voice_command_engine::Error::Unreachable("connection refused".to_string()));
    }
    let (assistant, handle, status) = harness.assistant(push_to_talk_settings());

    let driver = async {
        handle.push_to_talk();
        wait_until(|| harness.speech.spoken().contains(&phrases::UNREACHABLE.to_string())).await;
        wait_until(|| *status.borrow() == Status::Idle).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert_eq!(harness.transport.requests().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_client_action_clears_pending() {
    let harness = Harness::new([COMMAND, REPLY]);
    harness.transport.respond(send_message_to("Alice", "c-1", "hello"));
    harness.transport.respond(json!({
        "transcript": "thôi bỏ đi",
        "clientAction": { "type": "cancel" }
    }));
    let (assistant, handle, status) = harness.assistant(push_to_talk_settings());

    let driver = async {
        handle.push_to_talk();
        wait_until(|| harness.transport.requests().len() == 2).await;
        wait_until(|| *status.borrow() == Status::Idle).await;
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert!(harness.chat.calls().is_empty());
    assert_eq!(
        harness.speech.spoken().last().unwrap(),
        &phrases::cancelled(Some("send_message"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_denied_microphone_disables_the_assistant() {
    let harness = Harness::with_microphone(common::FakeMicrophone::denied());
    let (assistant, _handle, status) = harness.assistant(wake_word_settings());

    let err = assistant.run().await.unwrap_err();

    assert!(err.is_terminal());
    assert!(matches!(*status.borrow(), Status::Disabled(_)));
}

#[tokio::test(start_paused = true)]
async fn test_voice_commands_turned_off() {
    let harness = Harness::new([COMMAND]);
    let settings = voice_command_engine::Settings {
        stt_enabled: false,
        ..wake_word_settings()
    };
    let (assistant, handle, status) = harness.assistant(settings);

    let driver = async {
        handle.push_to_talk();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(matches!(*status.borrow(), Status::Disabled(_)));
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();

    assert_eq!(harness.mic.opens(), 0);
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reload_switches_to_push_to_talk() {
    let harness = Harness::new([Script::Silence]);
    let (assistant, handle, status) = harness.assistant(wake_word_settings());

    let driver = async {
        wait_until(|| *status.borrow() == Status::Listening).await;
        handle.reload(push_to_talk_settings());
        wait_until(|| *status.borrow() == Status::Idle).await;
        assert_eq!(harness.mic.active(), 0);
        handle.shutdown();
    };
    let (result, ()) = tokio::join!(assistant.run(), driver);
    result.unwrap();
}

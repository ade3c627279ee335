use proptest::prelude::*;

use preview_protocol::{
    Decoded, Frame, InboundMessage, NavigationMessage, RelayMessage, decode_frame,
};

// --- Decoding never panics ---

proptest! {
    #[test]
    fn arbitrary_text_never_panics(text in ".{0,256}") {
        let _ = decode_frame(&text);
    }

    #[test]
    fn arbitrary_json_objects_never_panic(
        channel in prop_oneof![Just("navigation".to_string()), Just("relay".to_string()), Just("broadcast_out".to_string()), "[a-z]{1,8}"],
        type_name in "[A-Z_]{0,24}",
        key in "[a-zA-Z]{1,8}",
        value in any::<i64>(),
    ) {
        let text = serde_json::json!({
            "channel": channel,
            "message": {"type": type_name, key: value},
        })
        .to_string();
        let _ = decode_frame(&text);
    }
}

// --- Known and unknown types ---

fn arb_tab_id() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9-]{1,36}"
}

proptest! {
    #[test]
    fn tab_online_survives_the_wire(tab_id in arb_tab_id(), path in "/[a-z/]{0,32}") {
        let url = format!("http://127.0.0.1:8080/preview/abc{path}");
        let frame = Frame::new(
            Some(tab_id.clone()),
            RelayMessage::TabOnline { tab_id: tab_id.clone(), url: url.clone() },
        );
        let decoded = decode_frame(&serde_json::to_string(&frame).unwrap()).unwrap();
        prop_assert_eq!(decoded.tab_id.as_deref(), Some(tab_id.as_str()));
        prop_assert_eq!(decoded.message.announced_tab(), Some(tab_id.as_str()));
        prop_assert_eq!(
            decoded.message,
            InboundMessage::Relay(Decoded::Known(RelayMessage::TabOnline { tab_id, url }))
        );
    }

    #[test]
    fn unrecognised_types_are_unknown(type_name in "X_[A-Z]{1,16}") {
        let text = serde_json::json!({
            "channel": "navigation",
            "message": {"type": type_name},
        })
        .to_string();
        match decode_frame(&text).unwrap().message {
            InboundMessage::Navigation(Decoded::Unknown { type_name: got, .. }) => {
                prop_assert_eq!(got, type_name);
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn hub_only_navigation_is_always_rejected(url in "[a-z:/.]{1,40}", force in any::<bool>()) {
        let frame = Frame::new(None, NavigationMessage::RedirectPage { url, force });
        prop_assert!(decode_frame(&serde_json::to_string(&frame).unwrap()).is_err());
    }
}

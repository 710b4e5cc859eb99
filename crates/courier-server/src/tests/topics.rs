use std::collections::BTreeMap;

use courier_shared::constants::*;
use courier_shared::{ClientId, Frame, NodeAddr, RoutedCommand};
use courier_store::MessageStore;

use super::*;

async fn join(client: &mut TestClient, router: &Router, topic: &str) {
    client
        .send(router, Frame::new(JOIN_TOPIC_CMD).arg(topic))
        .await;
    let reply = client.drain();
    assert!(reply[0].ok, "join refused: {reply:?}");
}

#[tokio::test]
async fn test_fan_out_sends_one_envelope_per_remote_node() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let n2 = node("node-2", &store).await;
    let n3 = node("node-3", &store).await;
    let n4 = node("node-4", &store).await;
    let mut wire = link(&n1, "peers").await;

    let mut alice = login(&n1, "alice").await;
    alice
        .send(&n1, Frame::new(CREATE_TOPIC_CMD).arg("rust"))
        .await;
    assert_eq!(alice.drain()[0].args, vec![CREATE_TOPIC_CMD, "rust"]);

    let mut bob = login(&n2, "bob").await;
    let mut carol = login(&n3, "carol").await;
    let mut dave = login(&n3, "dave").await;
    let mut erin = login(&n4, "erin").await;
    join(&mut bob, &n2, "rust").await;
    join(&mut carol, &n3, "rust").await;
    join(&mut dave, &n3, "rust").await;
    join(&mut erin, &n4, "rust").await;
    // frank joins and never comes back.
    let mut frank = login(&n1, "frank").await;
    join(&mut frank, &n1, "rust").await;
    frank.send(&n1, Frame::new(SEND_LOGOUT_CMD)).await;

    alice
        .send(&n1, Frame::new(SEND_MESSAGE_TOPIC_CMD).arg("rust").arg("hi all"))
        .await;
    let reply = alice.drain();
    assert_eq!(reply[0].name, RESP_SEND_TOPIC_CMD);
    let uuid = reply[0].args[0].clone();

    let sent = envelopes(&mut wire);
    assert_eq!(sent.len(), 3);
    let mut by_node: BTreeMap<NodeAddr, Vec<ClientId>> = BTreeMap::new();
    for envelope in &sent {
        match envelope.command().unwrap() {
            RoutedCommand::DeliverTopic { members, .. } => {
                by_node.insert(envelope.target.clone(), members);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
    assert_eq!(by_node[&NodeAddr::from("node-2")], vec![ClientId::from("bob")]);
    assert_eq!(by_node[&NodeAddr::from("node-3")].len(), 2);
    assert_eq!(by_node[&NodeAddr::from("node-4")], vec![ClientId::from("erin")]);

    for envelope in sent {
        let target = match envelope.target.as_str() {
            "node-2" => &n2,
            "node-3" => &n3,
            _ => &n4,
        };
        target.handle_routed(envelope).await;
    }
    for client in [&mut bob, &mut carol, &mut dave, &mut erin] {
        let pushed = client.drain();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].name, RESP_MESSAGE_TOPIC_CMD);
        assert_eq!(pushed[0].args[0], "hi all");
        assert_eq!(pushed[0].args[1], "rust");
        assert_eq!(pushed[0].args[3], uuid);
    }
    assert_eq!(n3.acks.topic.len().await, 2);

    // The sender is not a recipient; frank gets it on his next login.
    assert!(alice.drain().is_empty());
    let undelivered = store
        .read_undelivered_messages(&ClientId::from("frank"))
        .unwrap();
    assert_eq!(undelivered.len(), 1);
}

#[tokio::test]
async fn test_topic_receipts_are_per_recipient() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n1, "bob").await;
    let mut carol = login(&n1, "carol").await;

    alice.send(&n1, Frame::new(CREATE_TOPIC_CMD).arg("t")).await;
    join(&mut bob, &n1, "t").await;
    join(&mut carol, &n1, "t").await;
    alice.drain();

    alice
        .send(&n1, Frame::new(SEND_MESSAGE_TOPIC_CMD).arg("t").arg("x"))
        .await;
    let uuid = alice.drain()[0].args[0].clone();
    assert_eq!(n1.acks.topic.len().await, 2);

    bob.drain();
    bob.send(&n1, Frame::new(TOPIC_ACK_CMD).arg(uuid.as_str())).await;
    assert_eq!(n1.acks.topic.len().await, 1);

    assert!(store
        .read_undelivered_messages(&ClientId::from("bob"))
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .read_undelivered_messages(&ClientId::from("carol"))
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_topic_management_errors() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n1, "bob").await;

    alice.send(&n1, Frame::new(CREATE_TOPIC_CMD).arg("t")).await;
    alice.drain();
    alice.send(&n1, Frame::new(CREATE_TOPIC_CMD).arg("t")).await;
    assert!(!alice.drain()[0].ok);

    bob.send(&n1, Frame::new(SEND_MESSAGE_TOPIC_CMD).arg("t").arg("hi"))
        .await;
    let refused = bob.drain();
    assert_eq!(refused[0].name, RESP_SEND_TOPIC_CMD);
    assert!(!refused[0].ok);

    bob.send(&n1, Frame::new(TOPIC_MEMBERS_LIST_CMD).arg("t")).await;
    assert!(!bob.drain()[0].ok);

    bob.send(&n1, Frame::new(JOIN_TOPIC_CMD).arg("nope")).await;
    assert!(!bob.drain()[0].ok);

    join(&mut bob, &n1, "t").await;
    bob.send(&n1, Frame::new(TOPIC_MEMBERS_LIST_CMD).arg("t")).await;
    let members = bob.drain();
    assert!(members[0].ok);
    assert!(members[0].args.contains(&"alice:online".to_string()));
    assert!(members[0].args.contains(&"bob:online".to_string()));

    bob.send(&n1, Frame::new(LIST_TOPIC_CMD)).await;
    assert_eq!(bob.drain()[0].args, vec![LIST_TOPIC_CMD, "t"]);

    bob.send(&n1, Frame::new(LEAVE_TOPIC_CMD).arg("t")).await;
    assert!(bob.drain()[0].ok);
    bob.send(&n1, Frame::new(LEAVE_TOPIC_CMD).arg("t")).await;
    assert!(!bob.drain()[0].ok);
}

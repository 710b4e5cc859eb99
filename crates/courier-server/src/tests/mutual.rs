use chrono::{Duration, Utc};
use uuid::Uuid;

use courier_shared::constants::*;
use courier_shared::{ClientId, Frame, MutualRequest, TopicId};
use courier_store::MessageStore;

use super::*;

fn ask(kind: &str, target: &str) -> Frame {
    Frame::new(SEND_ASK_CMD).arg(kind).arg(target)
}

#[tokio::test]
async fn test_offline_friend_request_is_listed_once() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;

    alice.send(&n1, ask(ASK_ADD_FRIEND, "bob")).await;
    let reply = alice.drain();
    assert_eq!(reply[0].name, RESP_ASK_CMD);
    let uuid = Uuid::parse_str(&reply[0].args[0]).unwrap();

    let stored = store.get_mutual_request(uuid).unwrap().unwrap();
    assert!(!stored.resolved);
    assert_eq!(stored.to, ClientId::from("bob"));

    let mut bob = TestClient::connect("bob");
    bob.send(&n1, Frame::new(SEND_CLIENT_ID_CMD).arg("bob")).await;
    let pushed = bob.drain();
    assert_eq!(pushed.len(), 2);
    assert_eq!(pushed[1].name, RECEIVE_ASK_CMD);
    assert_eq!(pushed[1].args[0], ASK_ADD_FRIEND);
    assert_eq!(pushed[1].args[1], "alice");
    assert_eq!(pushed[1].args[3], uuid.to_string());
    assert!(n1.acks.mutual.contains(&uuid).await);

    bob.send(&n1, Frame::new(LIST_ASK_CMD)).await;
    let listed = bob.drain();
    assert_eq!(listed[0].args[0], LIST_ASK_CMD);
    assert_eq!(listed[0].args.len(), 2);
    let request: MutualRequest = serde_json::from_str(&listed[0].args[1]).unwrap();
    assert_eq!(request.uuid, uuid);
    assert_eq!(request.from, ClientId::from("alice"));
}

#[tokio::test]
async fn test_cross_node_friendship_is_established() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let n2 = node("node-2", &store).await;
    let mut to_n2 = link(&n1, "node-2").await;
    let mut to_n1 = link(&n2, "node-1").await;

    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n2, "bob").await;

    alice.send(&n1, ask(ASK_ADD_FRIEND, "bob")).await;
    let uuid = alice.drain()[0].args[0].clone();
    assert_eq!(pump(&mut to_n2, &n2).await, 1);

    let received = bob.drain();
    assert_eq!(received[0].name, RECEIVE_ASK_CMD);
    assert_eq!(received[0].args[3], uuid);

    bob.send(
        &n2,
        Frame::new(SEND_REACT_CMD).arg(REACT_AGREE).arg(uuid.as_str()),
    )
    .await;
    let reply = bob.drain();
    assert_eq!(reply[0].name, RESP_REACT_CMD);
    assert_eq!(reply[0].args, vec![REACT_AGREE, uuid.as_str()]);
    assert!(n2.acks.mutual.is_empty().await);

    // The reaction travels back to alice through a notice envelope.
    assert_eq!(pump(&mut to_n1, &n1).await, 1);
    let notice = alice.drain();
    assert_eq!(notice[0].name, RECEIVE_REACT_CMD);
    assert_eq!(notice[0].args[0], REACT_AGREE);
    assert_eq!(notice[0].args[2], "bob");

    alice.send(&n1, Frame::new(VIEW_FRIENDS_CMD)).await;
    assert_eq!(alice.drain()[0].args, vec![VIEW_FRIENDS_CMD, "bob"]);
    bob.send(&n2, Frame::new(VIEW_FRIENDS_CMD)).await;
    assert_eq!(bob.drain()[0].args, vec![VIEW_FRIENDS_CMD, "alice"]);

    // A second answer is refused.
    bob.send(
        &n2,
        Frame::new(SEND_REACT_CMD).arg(REACT_REFUSE).arg(uuid.as_str()),
    )
    .await;
    assert!(!bob.drain()[0].ok);
}

#[tokio::test]
async fn test_friend_request_guards() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n1, "bob").await;

    alice.send(&n1, ask(ASK_ADD_FRIEND, "alice")).await;
    assert!(!alice.drain()[0].ok);

    alice.send(&n1, ask(ASK_ADD_FRIEND, "bob")).await;
    let uuid = alice.drain()[0].args[0].clone();
    bob.drain();

    // Only the addressee may answer.
    alice
        .send(&n1, Frame::new(SEND_REACT_CMD).arg(REACT_AGREE).arg(uuid.as_str()))
        .await;
    assert!(!alice.drain()[0].ok);

    bob.send(&n1, Frame::new(SEND_REACT_CMD).arg(REACT_AGREE).arg(uuid.as_str()))
        .await;
    assert!(bob.drain()[0].ok);
    alice.drain();

    alice.send(&n1, ask(ASK_ADD_FRIEND, "bob")).await;
    assert!(!alice.drain()[0].ok);

    alice.send(&n1, Frame::new(DEL_FRIEND_CMD).arg("bob")).await;
    assert_eq!(alice.drain()[0].args, vec![DEL_FRIEND_CMD, "bob"]);
    assert!(!store
        .are_friends(&ClientId::from("alice"), &ClientId::from("bob"))
        .unwrap());

    alice.send(&n1, Frame::new(DEL_FRIEND_CMD).arg("bob")).await;
    assert!(!alice.drain()[0].ok);
}

#[tokio::test]
async fn test_join_request_goes_to_founder_and_adds_member() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n1, "bob").await;

    alice.send(&n1, Frame::new(CREATE_TOPIC_CMD).arg("club")).await;
    alice.drain();

    bob.send(&n1, ask(ASK_ADD_TOPIC, "club")).await;
    let uuid = bob.drain()[0].args[0].clone();

    let received = alice.drain();
    assert_eq!(received[0].name, RECEIVE_ASK_CMD);
    assert_eq!(received[0].args[1], "bob");
    assert_eq!(received[0].args[4], "club");

    alice
        .send(&n1, Frame::new(SEND_REACT_CMD).arg(REACT_AGREE).arg(uuid.as_str()))
        .await;
    assert!(alice.drain()[0].ok);
    assert!(store
        .is_topic_member(&TopicId::from("club"), &ClientId::from("bob"))
        .unwrap());

    let notice = bob.drain();
    assert_eq!(notice[0].name, RECEIVE_REACT_CMD);
    assert_eq!(notice[0].args[1], ASK_ADD_TOPIC);
    assert_eq!(notice[0].args[4], "club");
}

#[tokio::test]
async fn test_invite_requires_membership() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n1, "bob").await;

    alice.send(&n1, Frame::new(CREATE_TOPIC_CMD).arg("club")).await;
    alice.drain();

    bob.send(&n1, ask(ASK_INVITE_TOPIC, "carol").arg("club")).await;
    assert!(!bob.drain()[0].ok);

    alice
        .send(&n1, ask(ASK_INVITE_TOPIC, "bob").arg("club"))
        .await;
    let uuid = alice.drain()[0].args[0].clone();
    assert_eq!(bob.drain()[0].args[0], ASK_INVITE_TOPIC);

    bob.send(&n1, Frame::new(SEND_REACT_CMD).arg(REACT_REFUSE).arg(uuid.as_str()))
        .await;
    assert!(bob.drain()[0].ok);
    assert!(!store
        .is_topic_member(&TopicId::from("club"), &ClientId::from("bob"))
        .unwrap());
}

#[tokio::test]
async fn test_unanswered_request_is_resent_then_abandoned() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n1, "bob").await;

    alice.send(&n1, ask(ASK_ADD_FRIEND, "bob")).await;
    let uuid = Uuid::parse_str(&alice.drain()[0].args[0]).unwrap();
    assert_eq!(bob.drain().len(), 1);
    let start = Utc::now();
    let step = Duration::seconds(11);

    for attempt in 1..=5 {
        let report = n1.sweep_acks(start + step * attempt).await;
        assert_eq!(report.resent, 1, "attempt {attempt}");
        assert_eq!(n1.acks.mutual.retries(&uuid).await, Some(attempt as u32));
    }
    let last = n1.sweep_acks(start + step * 6).await;
    assert_eq!(last.abandoned, 1);
    assert!(!n1.acks.mutual.contains(&uuid).await);

    let resent = bob.drain();
    assert_eq!(resent.len(), 5);
    assert!(resent
        .iter()
        .all(|r| r.name == RECEIVE_ASK_CMD && r.args[3] == uuid.to_string()));

    // Abandoning the push leaves the request open.
    let pending = store
        .pending_mutual_requests(&ClientId::from("bob"))
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_request_entry_dropped_when_target_leaves() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n1, "bob").await;

    alice.send(&n1, ask(ASK_ADD_FRIEND, "bob")).await;
    let uuid = Uuid::parse_str(&alice.drain()[0].args[0]).unwrap();
    bob.drain();
    let start = Utc::now();

    bob.send(&n1, Frame::new(SEND_LOGOUT_CMD)).await;

    let report = n1.sweep_acks(start + Duration::seconds(11)).await;
    assert_eq!(report.dropped, 1);
    assert_eq!(report.resent, 0);
    assert!(!n1.acks.mutual.contains(&uuid).await);
    assert_eq!(
        store
            .pending_mutual_requests(&ClientId::from("bob"))
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_request_receipt_only_counts_from_target() {
    let store = shared_store();
    let n1 = node("node-1", &store).await;
    let mut alice = login(&n1, "alice").await;
    let mut bob = login(&n1, "bob").await;

    alice.send(&n1, ask(ASK_ADD_FRIEND, "bob")).await;
    let uuid = alice.drain()[0].args[0].clone();
    bob.drain();
    let parsed = Uuid::parse_str(&uuid).unwrap();

    alice
        .send(&n1, Frame::new(MUTUAL_ACK_CMD).arg(uuid.as_str()))
        .await;
    assert!(n1.acks.mutual.contains(&parsed).await);

    bob.send(&n1, Frame::new(MUTUAL_ACK_CMD).arg(uuid.as_str()))
        .await;
    assert!(!n1.acks.mutual.contains(&parsed).await);
}

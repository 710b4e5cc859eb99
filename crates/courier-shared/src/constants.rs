/// Protocol version advertised on `/info`.
pub const PROTOCOL_VERSION: &str = "/courier/1.0.0";

// -- Client commands --

pub const SEND_CLIENT_ID_CMD: &str = "SEND_CLIENT_ID";
pub const SEND_LOGOUT_CMD: &str = "SEND_LOGOUT";
pub const SEND_PING_CMD: &str = "SEND_PING";
pub const SUBSCRIBE_CHANNEL_CMD: &str = "SUBSCRIBE_CHANNEL";
pub const SEND_MESSAGE_P2P_CMD: &str = "SEND_MESSAGE_P2P";
pub const P2P_ACK_CMD: &str = "P2P_ACK";
pub const SEND_MESSAGE_TOPIC_CMD: &str = "SEND_MESSAGE_TOPIC";
pub const TOPIC_ACK_CMD: &str = "TOPIC_ACK";
pub const CREATE_TOPIC_CMD: &str = "CREATE_TOPIC";
pub const JOIN_TOPIC_CMD: &str = "JOIN_TOPIC";
pub const LEAVE_TOPIC_CMD: &str = "LEAVE_TOPIC";
pub const LIST_TOPIC_CMD: &str = "LIST_TOPIC";
pub const TOPIC_MEMBERS_LIST_CMD: &str = "TOPIC_MEMBERS_LIST";
pub const VIEW_FRIENDS_CMD: &str = "VIEW_FRIENDS";
pub const DEL_FRIEND_CMD: &str = "DEL_FRIEND";
pub const SEND_ASK_CMD: &str = "SEND_ASK";
pub const SEND_REACT_CMD: &str = "SEND_REACT";
pub const MUTUAL_ACK_CMD: &str = "MUTUAL_ACK";
pub const LIST_ASK_CMD: &str = "LIST_ASK";

// -- Routed (node to node) commands --

pub const ROUTE_MSG_CMD: &str = "ROUTE_MSG";
pub const ROUTE_MESSAGE_P2P_CMD: &str = "ROUTE_MESSAGE_P2P";
pub const ROUTE_MESSAGE_TOPIC_CMD: &str = "ROUTE_MESSAGE_TOPIC";
pub const ROUTE_ASK_CMD: &str = "ROUTE_ASK";
pub const ROUTE_CHANGE_MESSAGE_SERVER_CMD: &str = "ROUTE_CHANGE_MESSAGE_SERVER";
pub const ROUTE_NOTICE_CMD: &str = "ROUTE_NOTICE";

// -- Node to client --

pub const RESP_CLIENT_ID_CMD: &str = "RESP_CLIENT_ID";
pub const RESP_LOGOUT_CMD: &str = "RESP_LOGOUT";
pub const RESP_PING_CMD: &str = "RESP_PING";
pub const RESP_SEND_P2P_CMD: &str = "RESP_SEND_P2P";
pub const RESP_MESSAGE_P2P_CMD: &str = "RESP_MESSAGE_P2P";
pub const RESP_SEND_TOPIC_CMD: &str = "RESP_SEND_TOPIC";
pub const RESP_MESSAGE_TOPIC_CMD: &str = "RESP_MESSAGE_TOPIC";
pub const RESP_TOPIC_CMD: &str = "RESP_TOPIC";
pub const RESP_FRIENDS_CMD: &str = "RESP_FRIENDS";
pub const RESP_ASK_CMD: &str = "RESP_ASK";
pub const RECEIVE_ASK_CMD: &str = "RECEIVE_ASK";
pub const RESP_REACT_CMD: &str = "RESP_REACT";
pub const RECEIVE_REACT_CMD: &str = "RECEIVE_REACT";
pub const RESP_ERROR_CMD: &str = "RESP_ERROR";

// -- Control channel payloads --

pub const CLIENT_STATUS_CMD: &str = "CLIENT_STATUS";
pub const TOPIC_STATUS_CMD: &str = "TOPIC_STATUS";
pub const TOPIC_SYNC_CMD: &str = "TOPIC_SYNC";
pub const MONITOR_CMD: &str = "MONITOR";

// -- Mutual request vocabulary --

pub const ASK_ADD_FRIEND: &str = "add_friend";
pub const ASK_ADD_TOPIC: &str = "add_topic";
pub const ASK_INVITE_TOPIC: &str = "invite_topic";
pub const REACT_AGREE: &str = "agree";
pub const REACT_REFUSE: &str = "refuse";

// -- Human readable messages --

pub const MSG_RELOGIN: &str = "you have been logged in elsewhere, please re-login";
pub const MSG_INTERNAL: &str = "internal error";
pub const MSG_NOT_AUTHENTICATED: &str = "not authenticated";
pub const MSG_UNKNOWN_COMMAND: &str = "unknown command";

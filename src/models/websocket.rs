use serde::{ Serialize, Deserialize };

use super::chat::{ ConversationMessage, Notice, NoticeLevel, SearchResult };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "register")] Register {
        email: String,
        password: String,
    },
    #[serde(rename = "login")] Login {
        email: String,
        password: String,
    },
    #[serde(rename = "logout")]
    Logout,
    #[serde(rename = "feedback")] Feedback {
        message: String,
    },
    #[serde(rename = "history")]
    History,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "status")] Status {
        phase: String,
        label: String,
    },
    #[serde(rename = "response")] Response {
        content: String,
        sources: Vec<SearchResult>,
        timestamp: i64,
    },
    #[serde(rename = "notice")] Notice {
        level: NoticeLevel,
        message: String,
    },
    #[serde(rename = "history")] History {
        messages: Vec<ConversationMessage>,
    },
    #[serde(rename = "session")] Session {
        authenticated: bool,
        email: Option<String>,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}

impl From<Notice> for ServerMessage {
    fn from(notice: Notice) -> Self {
        ServerMessage::Notice {
            level: notice.level,
            message: notice.message,
        }
    }
}

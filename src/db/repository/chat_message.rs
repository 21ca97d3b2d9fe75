use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

pub fn insert_chat_message(conn: &Connection, msg: &ChatMessage) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO chat_messages (id, user_input, ai_response, created_at, patient_id,
         message_type, confidence_score, requires_follow_up)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            msg.id.to_string(),
            msg.user_input,
            msg.ai_response,
            format_datetime(&msg.created_at),
            msg.patient_id.map(|id| id.to_string()),
            msg.message_type.as_str(),
            msg.confidence_score,
            msg.requires_follow_up,
        ],
    )?;
    Ok(())
}

/// Transcript entries newest first, optionally restricted to one patient.
pub fn get_chat_messages(
    conn: &Connection,
    patient_id: Option<&Uuid>,
) -> Result<Vec<ChatMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_input, ai_response, created_at, patient_id, message_type,
                confidence_score, requires_follow_up
         FROM chat_messages
         WHERE ?1 IS NULL OR patient_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows = stmt.query_map(params![patient_id.map(|id| id.to_string())], |row| {
        Ok(ChatMessageRow {
            id: row.get(0)?,
            user_input: row.get(1)?,
            ai_response: row.get(2)?,
            created_at: row.get(3)?,
            patient_id: row.get(4)?,
            message_type: row.get(5)?,
            confidence_score: row.get(6)?,
            requires_follow_up: row.get(7)?,
        })
    })?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(chat_message_from_row(row?)?);
    }
    Ok(messages)
}

struct ChatMessageRow {
    id: String,
    user_input: String,
    ai_response: String,
    created_at: String,
    patient_id: Option<String>,
    message_type: String,
    confidence_score: f64,
    requires_follow_up: bool,
}

fn chat_message_from_row(row: ChatMessageRow) -> Result<ChatMessage, DatabaseError> {
    Ok(ChatMessage {
        id: parse_uuid(&row.id)?,
        user_input: row.user_input,
        ai_response: row.ai_response,
        created_at: parse_datetime(&row.created_at)?,
        patient_id: row.patient_id.as_deref().map(parse_uuid).transpose()?,
        message_type: MessageType::from_str(&row.message_type)?,
        confidence_score: row.confidence_score,
        requires_follow_up: row.requires_follow_up,
    })
}

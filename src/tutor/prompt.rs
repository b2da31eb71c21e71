//! Prompt Builder - 시스템 프롬프트 + 최근 대화 + 컨텍스트가 담긴 질문

use crate::llm::ChatMessage;
use crate::scraper::ScrapeOrigin;
use crate::store::{ConversationTurn, TurnRole};

/// 프롬프트에 넣는 이전 대화 교환 수
pub const HISTORY_EXCHANGES: usize = 3;

/// 보충 콘텐츠 앞에 붙는 구분 헤더
pub fn scraped_section_header(origin: ScrapeOrigin) -> &'static str {
    match origin {
        ScrapeOrigin::Primary => "\n\n--- Web Scraped Content ---\n\n",
        ScrapeOrigin::Secondary => "\n\n--- Educational Portal Content ---\n\n",
    }
}

/// 사용자 프롬프트 (컨텍스트가 없으면 교과서 내용이 없다고 명시)
pub fn build_user_prompt(query: &str, context: &str, grade: u8) -> String {
    if context.is_empty() {
        format!(
            "I have a question, but I don't have textbook content available right now. \n\
             Please help me understand this using your knowledge:\n\n\
             QUESTION: {query}\n\n\
             Please explain clearly and appropriately for a Class {grade} student."
        )
    } else {
        format!(
            "Use the following context from NCERT textbooks to answer my question. \n\
             If the context doesn't have the complete answer, you can add from your knowledge, \
             but clearly indicate what's from the textbook vs your explanation.\n\n\
             CONTEXT:\n{context}\n\n\
             QUESTION: {query}\n\n\
             Please provide a clear, accurate answer suitable for Class {grade}."
        )
    }
}

/// 기록을 (질문, 답변) 교환으로 묶어 최근 `limit`개 반환
///
/// 사용자 턴이 교환을 열고 바로 다음 어시스턴트 턴이 닫습니다.
/// 답이 없는 질문이나 짝 없는 답변은 건너뜁니다.
pub fn recent_exchanges(history: &[ConversationTurn], limit: usize) -> Vec<(&str, &str)> {
    let mut exchanges = Vec::new();
    let mut pending: Option<&str> = None;

    for turn in history {
        match turn.role {
            TurnRole::User => pending = Some(turn.content.as_str()),
            TurnRole::Assistant => {
                if let Some(question) = pending.take() {
                    exchanges.push((question, turn.content.as_str()));
                }
            }
        }
    }

    let skip = exchanges.len().saturating_sub(limit);
    exchanges.split_off(skip)
}

/// 완성 게이트웨이에 넘길 메시지 시퀀스
pub fn build_messages(
    system_prompt: String,
    history: &[ConversationTurn],
    user_prompt: String,
) -> Vec<ChatMessage> {
    let exchanges = recent_exchanges(history, HISTORY_EXCHANGES);

    let mut messages = Vec::with_capacity(exchanges.len() * 2 + 2);
    messages.push(ChatMessage::system(system_prompt));
    for (question, answer) in exchanges {
        messages.push(ChatMessage::user(question));
        messages.push(ChatMessage::assistant(answer));
    }
    messages.push(ChatMessage::user(user_prompt));

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRole;

    #[test]
    fn test_user_prompt_without_context() {
        let prompt = build_user_prompt("What is a triangle?", "", 6);

        assert!(prompt.contains("don't have textbook content available"));
        assert!(prompt.contains("QUESTION: What is a triangle?"));
        assert!(prompt.ends_with("appropriately for a Class 6 student."));
        assert!(!prompt.contains("CONTEXT:"));
    }

    #[test]
    fn test_user_prompt_with_context() {
        let prompt = build_user_prompt("Define speed", "[Source: NCERT]\nSpeed is distance per time.", 7);

        assert!(prompt.contains("CONTEXT:\n[Source: NCERT]\nSpeed is distance per time."));
        assert!(prompt.contains("QUESTION: Define speed"));
        assert!(prompt.ends_with("suitable for Class 7."));
    }

    #[test]
    fn test_recent_exchanges_pairs_and_limits() {
        let history = vec![
            ConversationTurn::assistant("orphan answer"),
            ConversationTurn::user("q1"),
            ConversationTurn::assistant("a1"),
            ConversationTurn::user("q2"),
            ConversationTurn::assistant("a2"),
            ConversationTurn::user("unanswered"),
            ConversationTurn::user("q3"),
            ConversationTurn::assistant("a3"),
            ConversationTurn::user("q4"),
            ConversationTurn::assistant("a4"),
        ];

        let exchanges = recent_exchanges(&history, HISTORY_EXCHANGES);
        assert_eq!(exchanges, vec![("q2", "a2"), ("q3", "a3"), ("q4", "a4")]);
    }

    #[test]
    fn test_build_messages_order() {
        let history = vec![
            ConversationTurn::user("What is 2+2?"),
            ConversationTurn::assistant("4"),
        ];

        let messages = build_messages("system".into(), &history, "next".into());
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();

        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        assert_eq!(messages[1].content, "What is 2+2?");
        assert_eq!(messages[3].content, "next");
    }

    #[test]
    fn test_scraped_headers() {
        assert!(scraped_section_header(ScrapeOrigin::Primary).contains("Web Scraped Content"));
        assert!(scraped_section_header(ScrapeOrigin::Secondary).contains("Educational Portal Content"));
    }
}

use serde::{Deserialize, Serialize};

/// 对话中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// 一段历史会话（Provider 需要记住的内容）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(alias = "session_id")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub messages: Vec<Message>,
}

impl Session {
    /// 将会话拼接为纯文本（"role: content" 每行一条）
    pub fn to_transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 数据集中的一道题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkQuestion {
    #[serde(alias = "question_id")]
    pub question_id: String,

    #[serde(alias = "question_type")]
    pub question_type: String,

    pub question: String,

    /// 标准答案（数据集中可能是字符串或数字）
    #[serde(deserialize_with = "deserialize_answer")]
    pub answer: String,

    #[serde(default, alias = "question_date", skip_serializing_if = "Option::is_none")]
    pub question_date: Option<String>,

    #[serde(default)]
    pub sessions: Vec<Session>,
}

// 标准答案可能是字符串，也可能是整数/浮点数
pub(crate) fn deserialize_answer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct AnswerVisitor;

    impl<'de> Visitor<'de> for AnswerVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or number representing an answer")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(AnswerVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_accepts_number_and_string() {
        let q: BenchmarkQuestion = serde_json::from_str(
            r#"{"questionId":"q1","questionType":"temporal","question":"几天?","answer":3}"#,
        )
        .unwrap();
        assert_eq!(q.answer, "3");
        assert!(q.sessions.is_empty());

        let q: BenchmarkQuestion = serde_json::from_str(
            r#"{"question_id":"q2","question_type":"single-session-user","question":"颜色?","answer":"蓝色"}"#,
        )
        .unwrap();
        assert_eq!(q.question_id, "q2");
        assert_eq!(q.answer, "蓝色");
    }

    #[test]
    fn test_session_transcript() {
        let session = Session {
            session_id: "s1".to_string(),
            date: None,
            messages: vec![
                Message {
                    role: "user".to_string(),
                    content: "我养了一只猫".to_string(),
                },
                Message {
                    role: "assistant".to_string(),
                    content: "它叫什么名字?".to_string(),
                },
            ],
        };
        assert_eq!(
            session.to_transcript(),
            "user: 我养了一只猫\nassistant: 它叫什么名字?"
        );
    }
}

//! 短期记忆：对话历史
//!
//! 进程内唯一、只追加的 Turn 序列：创建时为空，从不截断、从不持久化。
//! 只有 push（追加一条）与 commit（接收以当前历史为前缀的扩展提案）两种写入方式，
//! 保证后端每次收到的都是此前全部内容的一致前缀。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 消息角色（与 Gemini contents.role 一致）；工具结果也以 User 身份提交
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 对话内容的最小单元
#[derive(Clone, Debug, PartialEq)]
pub enum Part {
    Text(String),
    /// 模型的推理过程，只转发展示，不作为回答
    Thought(String),
    FunctionCall {
        name: String,
        args: Map<String, Value>,
        /// 供应商不透明的续接令牌，必须原样回传
        signature: Option<String>,
    },
    FunctionResponse {
        name: String,
        response: Map<String, Value>,
    },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Part::FunctionCall { .. })
    }
}

/// 历史中的一条记录：角色 + 有序 Parts
#[derive(Clone, Debug, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// 合并所有纯文本 Part（不含 Thought）
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("proposed history is shorter than the current history ({proposed} < {current})")]
    Truncated { current: usize, proposed: usize },

    #[error("proposed history diverges from the current history at turn {0}")]
    Diverged(usize),
}

/// 只追加的对话历史
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// 接收一份「当前历史 + 若干新 Turn」的提案，只追加新增部分；前缀不一致则拒绝且不做任何修改
    pub fn commit(&mut self, proposed: Vec<Turn>) -> Result<usize, HistoryError> {
        let current = self.turns.len();
        if proposed.len() < current {
            return Err(HistoryError::Truncated {
                current,
                proposed: proposed.len(),
            });
        }
        if let Some(i) = self
            .turns
            .iter()
            .zip(proposed.iter())
            .position(|(a, b)| a != b)
        {
            return Err(HistoryError::Diverged(i));
        }
        let added = proposed.len() - current;
        self.turns.extend(proposed.into_iter().skip(current));
        Ok(added)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// 只读快照，交给流式驱动使用
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

//! 会话监管：cycle 生命周期与中断管理
//!
//! 每个 cycle 领取一个独立的子 token（父 token 为会话级）：Ctrl+C 只取消当前 cycle，
//! 下一个 cycle 领到的是新 token；退出时取消父 token，进行中的 cycle 随之结束。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    /// 会话级：Quit 时触发
    session: CancellationToken,
    /// 当前 cycle 的 token
    current: Option<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为新 cycle 创建取消令牌
    pub fn begin_cycle(&mut self) -> CancellationToken {
        let token = self.session.child_token();
        self.current = Some(token.clone());
        token
    }

    pub fn end_cycle(&mut self) {
        self.current = None;
    }

    /// 取消当前 cycle（用户 Ctrl+C）；没有进行中的 cycle 时返回 false
    pub fn cancel(&self) -> bool {
        match &self.current {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 结束整个会话
    pub fn shutdown(&self) {
        self.session.cancel();
    }
}

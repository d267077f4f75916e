//! 发射事件通道：每次提交后向订阅者发送一次，绝不在发射事务内部回调。
use std::sync::mpsc::{self, Receiver};

use crate::net::core::Net;
use crate::net::ids::TransitionId;
use crate::net::marking::TokenChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiringEvent {
    pub transition: TransitionId,
    pub direction: FiringDirection,
    pub changes: Vec<TokenChange>,
}

impl Net {
    /// 注册一个新的发射提交监听者。
    pub fn subscribe(&mut self) -> Receiver<FiringEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    pub(crate) fn publish(&mut self, event: FiringEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

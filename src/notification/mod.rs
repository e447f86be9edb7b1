//! 通知模块
//!
//! 向实时监听者广播“一轮检测已完成”事件

pub mod broker;

pub use broker::{
    Notifier, PublishReport, SubscriberId, SubscriberState, Subscription, SweepEvent,
    DEFAULT_SUBSCRIBER_CAPACITY,
};

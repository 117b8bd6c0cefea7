//! 监听器注册表（Listener Registry）
//!
//! 线程安全地添加、移除监听器，并向所有监听器分发 [`MalcolmEvent`]。
//!
//! # 所有权
//!
//! 注册表只保存 `Weak` 引用，监听器的所有权始终在调用方手中。
//! 调用方释放监听器后，注册表在下一次分发时自动清理该条目。
//! `add` 返回的 [`ListenerHandle`] 是移除时唯一需要的凭据。
//!
//! # 分发
//!
//! - 分发顺序不作保证，监听器不能依赖它
//! - 单个监听器 panic 不会影响其余监听器，panic 被记录后吞掉
//! - 分发期间可以并发 add/remove：被移除的监听器可能收到、也可能收不到当前事件
//!
//! # 示例
//!
//! ```rust
//! use malcolm_driver::listeners::{ListenerRegistry, MalcolmListener};
//! use malcolm_driver::MalcolmEvent;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let registry = ListenerRegistry::new();
//! let count = Arc::new(AtomicUsize::new(0));
//! let listener: Arc<dyn MalcolmListener> = {
//!     let count = count.clone();
//!     Arc::new(move |_: &MalcolmEvent| {
//!         count.fetch_add(1, Ordering::Relaxed);
//!     })
//! };
//! let handle = registry.add(listener.clone());
//! registry.fan_out(&MalcolmEvent::ConnectionChanged { connected: true });
//! assert_eq!(count.load(Ordering::Relaxed), 1);
//! assert!(registry.remove(handle));
//! ```

use crate::event::MalcolmEvent;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, trace};

/// 设备事件监听器
///
/// 回调在会话事件线程上执行，不是调用 `run()` 的线程。
/// 回调应尽快返回：慢监听器会延迟同一事件对其他监听器的分发。
pub trait MalcolmListener: Send + Sync {
    fn event_performed(&self, event: &MalcolmEvent);
}

impl<F> MalcolmListener for F
where
    F: Fn(&MalcolmEvent) + Send + Sync,
{
    fn event_performed(&self, event: &MalcolmEvent) {
        self(event)
    }
}

/// 注册凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

struct Entry {
    handle: ListenerHandle,
    listener: Weak<dyn MalcolmListener>,
}

#[derive(Default)]
pub struct ListenerRegistry {
    entries: RwLock<Vec<Entry>>,
    next_handle: AtomicU64,
    panics: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册监听器
    ///
    /// 同一个监听器（按指针判断）重复注册是幂等的，返回已有的凭据。
    /// 注册表只保留弱引用，传入的 `Arc` 在返回时释放。
    pub fn add(&self, listener: Arc<dyn MalcolmListener>) -> ListenerHandle {
        let weak = Arc::downgrade(&listener);
        let mut entries = self.entries.write();
        entries.retain(|e| e.listener.strong_count() > 0);
        if let Some(existing) = entries.iter().find(|e| Weak::ptr_eq(&e.listener, &weak)) {
            return existing.handle;
        }
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        entries.push(Entry {
            handle,
            listener: weak,
        });
        trace!("Listener {:?} registered ({} total)", handle, entries.len());
        handle
    }

    /// 移除监听器，返回它是否仍在注册表中
    pub fn remove(&self, handle: ListenerHandle) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.handle != handle);
        before != entries.len()
    }

    /// 当前存活的监听器数量
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.listener.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// 累计被捕获的监听器 panic 次数
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// 向所有存活的监听器分发事件，返回成功送达的数量
    ///
    /// 先在读锁下取快照，释放锁后再回调，因此监听器可以在回调中
    /// 调用 `add`/`remove` 而不会死锁。
    pub fn fan_out(&self, event: &MalcolmEvent) -> usize {
        let mut stale = false;
        let snapshot: SmallVec<[(ListenerHandle, Arc<dyn MalcolmListener>); 8]> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter_map(|e| match e.listener.upgrade() {
                    Some(listener) => Some((e.handle, listener)),
                    None => {
                        stale = true;
                        None
                    },
                })
                .collect()
        };

        let mut delivered = 0;
        for (handle, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.event_performed(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    self.panics.fetch_add(1, Ordering::Relaxed);
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("Listener {:?} panicked while handling {:?}: {}", handle, event, reason);
                },
            }
        }

        if stale {
            self.entries.write().retain(|e| e.listener.strong_count() > 0);
        }
        delivered
    }
}

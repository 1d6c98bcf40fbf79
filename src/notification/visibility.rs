//! 可见性跟踪 - 视口停留检测与 seen 确认批处理
//!
//! 只有元素在视口内达到面积阈值并连续停留足够时间才标记 seen，
//! 确认调用去抖合批发送。优先使用宿主环境的交叉观察回调
//! （`report_visibility`），没有该设施时退回 1s 轮询
//! （`LayoutProbe` 重算可见面积）。
//!
//! 已确认集合是会话级的：同一 id 在 tracker 销毁前不会重发。
//! 发送失败的 id 会从已确认集合移除，下次渲染重试。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::types::{BulkAction, BulkScope};
use crate::client::InboxContext;

/// 默认可见面积阈值
pub const DEFAULT_AREA_THRESHOLD: f64 = 0.5;
/// 默认连续停留时长（毫秒）
pub const DEFAULT_DWELL_MS: u64 = 1000;
/// 默认去抖时长（毫秒）
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
/// 单次确认请求的 id 上限，超出分块
pub const DEFAULT_BATCH_SIZE: usize = 20;
/// 轮询回退间隔（毫秒）
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// 跟踪策略配置
#[derive(Debug, Clone)]
pub struct VisibilityConfig {
    pub area_threshold: f64,
    pub dwell: Duration,
    pub debounce: Duration,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            area_threshold: DEFAULT_AREA_THRESHOLD,
            dwell: Duration::from_millis(DEFAULT_DWELL_MS),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl VisibilityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_area_threshold(mut self, threshold: f64) -> Self {
        self.area_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// 轮询回退：按包围盒重算元素当前可见面积比例
///
/// 返回 `None` 表示元素已不在布局中。
pub trait LayoutProbe: Send + Sync {
    fn visible_ratio(&self, id: &str) -> Option<f64>;
}

#[derive(Default)]
struct TrackerState {
    /// 达到面积阈值的元素 → 停留起点
    dwell_start: HashMap<String, Instant>,
    /// 会话级已确认集合
    acknowledged: HashSet<String>,
    /// 待发送批次（保持进入顺序，无重复）
    pending: Vec<String>,
    /// 最后一次 pending 变化（去抖基准）
    last_pending_change: Option<Instant>,
    /// 轮询模式下观察中的元素
    tracked: HashSet<String>,
    last_poll: Option<Instant>,
}

struct Inner {
    config: VisibilityConfig,
    state: Mutex<TrackerState>,
    ctx: Weak<InboxContext>,
    probe: Option<Box<dyn LayoutProbe>>,
}

impl Inner {
    /// 统一的可见性变化入口
    fn record(&self, id: &str, ratio: f64) {
        let mut state = self.state.lock().expect("tracker lock poisoned");
        if ratio >= self.config.area_threshold {
            state
                .dwell_start
                .entry(id.to_string())
                .or_insert_with(Instant::now);
        } else {
            // 跌破阈值即重置停留计时
            state.dwell_start.remove(id);
        }
    }

    /// 轮询回退 + 停留晋升，返回是否到达去抖发送时机
    fn sweep(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().expect("tracker lock poisoned");

        if let Some(probe) = &self.probe {
            let due = state
                .last_poll
                .map(|t| now.duration_since(t) >= self.config.poll_interval)
                .unwrap_or(true);
            if due {
                state.last_poll = Some(now);
                let tracked: Vec<String> = state.tracked.iter().cloned().collect();
                for id in tracked {
                    let ratio = probe.visible_ratio(&id).unwrap_or(0.0);
                    if ratio >= self.config.area_threshold {
                        state
                            .dwell_start
                            .entry(id)
                            .or_insert(now);
                    } else {
                        state.dwell_start.remove(&id);
                    }
                }
            }
        }

        // 停留达标且未确认过的元素进入待发送批次
        let promoted: Vec<String> = state
            .dwell_start
            .iter()
            .filter(|(id, started)| {
                now.duration_since(**started) >= self.config.dwell
                    && !state.acknowledged.contains(*id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in promoted {
            state.acknowledged.insert(id.clone());
            state.pending.push(id);
            state.last_pending_change = Some(now);
        }

        !state.pending.is_empty()
            && state
                .last_pending_change
                .map(|t| now.duration_since(t) >= self.config.debounce)
                .unwrap_or(false)
    }

    /// 取走当前批次
    fn drain(&self) -> Vec<String> {
        let mut state = self.state.lock().expect("tracker lock poisoned");
        state.last_pending_change = None;
        std::mem::take(&mut state.pending)
    }

    /// 分块发送确认请求
    async fn send(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let Some(ctx) = self.ctx.upgrade() else {
            // 客户端已销毁，确认落空是无害 no-op
            return;
        };
        for chunk in ids.chunks(self.config.batch_size) {
            let chunk_ids: Vec<String> = chunk.to_vec();
            debug!(count = chunk_ids.len(), "Flushing seen acknowledgments");
            if let Err(error) = ctx
                .api
                .bulk_update(BulkAction::Seen, &BulkScope::from_ids(chunk_ids.clone()))
                .await
            {
                warn!(error = %error, count = chunk_ids.len(), "Seen acknowledgment failed, ids will be retried");
                let mut state = self.state.lock().expect("tracker lock poisoned");
                for id in &chunk_ids {
                    state.acknowledged.remove(id);
                    // 停留计时同步清掉，重新可见时从头计
                    state.dwell_start.remove(id);
                }
            }
        }
    }
}

/// 可见性跟踪器
///
/// `destroy()` 断开所有观察并清空计时器与状态；`flush()` 立即
/// 排空待发送批次（用于组件卸载路径）。
pub struct VisibilityTracker {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl VisibilityTracker {
    pub(crate) fn new(
        ctx: Weak<InboxContext>,
        config: VisibilityConfig,
        probe: Option<Box<dyn LayoutProbe>>,
    ) -> Self {
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(TrackerState::default()),
            ctx,
            probe,
        });

        // 扫描周期取停留/去抖中较小者的一个零头，保证及时晋升
        let tick = inner
            .config
            .dwell
            .min(inner.config.debounce)
            .div_f64(4.0)
            .max(Duration::from_millis(5));
        let sweeper_inner = Arc::clone(&inner);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                if sweeper_inner.sweep() {
                    let batch = sweeper_inner.drain();
                    sweeper_inner.send(batch).await;
                }
            }
        });

        Self {
            inner,
            sweeper: Mutex::new(Some(handle)),
        }
    }

    /// 把元素纳入轮询观察（交叉观察可用时不需要）
    pub fn observe(&self, id: &str) {
        let mut state = self.inner.state.lock().expect("tracker lock poisoned");
        state.tracked.insert(id.to_string());
    }

    /// 停止观察某元素
    pub fn unobserve(&self, id: &str) {
        let mut state = self.inner.state.lock().expect("tracker lock poisoned");
        state.tracked.remove(id);
        state.dwell_start.remove(id);
    }

    /// 交叉观察回调入口：报告元素当前可见面积比例
    pub fn report_visibility(&self, id: &str, ratio: f64) {
        self.inner.record(id, ratio);
    }

    /// 立即排空待发送批次（含尚未到去抖时限的）
    pub async fn flush(&self) {
        // 先做一次晋升，让已达停留时限的元素赶上本批
        self.inner.sweep();
        let batch = self.inner.drain();
        self.inner.send(batch).await;
    }

    /// 断开观察、清空所有计时器与状态
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().expect("tracker lock poisoned").take() {
            handle.abort();
        }
        let mut state = self.inner.state.lock().expect("tracker lock poisoned");
        *state = TrackerState::default();
    }

    /// 已确认的 id 数（测试与诊断用）
    pub fn acknowledged_len(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("tracker lock poisoned")
            .acknowledged
            .len()
    }
}

impl Drop for VisibilityTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().expect("tracker lock poisoned").take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders_clamp() {
        let config = VisibilityConfig::new()
            .with_area_threshold(1.5)
            .with_batch_size(0);
        assert_eq!(config.area_threshold, 1.0);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_defaults_match_policy() {
        let config = VisibilityConfig::default();
        assert_eq!(config.area_threshold, 0.5);
        assert_eq!(config.dwell, Duration::from_millis(1000));
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
    }
}

use std::sync::Arc;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::config::MemoryProbeKind;

/// 进程内存快照能力（字节）。
///
/// 作为可注入依赖放在 `AppState` 中，测试可替换为固定值实现。
pub trait MemoryProbe: Send + Sync + 'static {
    fn snapshot(&self) -> i64;
}

/// 读取当前进程常驻内存（RSS，包含堆与堆外缓冲）。
///
/// 每次采样新建 `System`，只刷新本进程的内存信息，无共享可变状态。
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    fn snapshot(&self) -> i64 {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return 0;
        };
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::nothing().with_memory(),
        );
        sys.process(pid)
            .map(|p| i64::try_from(p.memory()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// 关闭采样：恒返回 0
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMemoryProbe;

impl MemoryProbe for NoopMemoryProbe {
    fn snapshot(&self) -> i64 {
        0
    }
}

pub fn probe_from_config(kind: MemoryProbeKind) -> Arc<dyn MemoryProbe> {
    match kind {
        MemoryProbeKind::Process => Arc::new(ProcessMemoryProbe),
        MemoryProbeKind::None => Arc::new(NoopMemoryProbe),
    }
}

/// 包裹一次管道执行的内存采样
pub struct MemoryWindow<'a> {
    probe: &'a dyn MemoryProbe,
    before: i64,
}

impl<'a> MemoryWindow<'a> {
    pub fn open(probe: &'a dyn MemoryProbe) -> Self {
        Self {
            before: probe.snapshot(),
            probe,
        }
    }

    /// `after - before`，允许为负（处理期间内存被回收）
    pub fn close(self) -> i64 {
        self.probe.snapshot().saturating_sub(self.before)
    }
}

/// `X-Memory-Usage` 头的取值
pub fn format_memory_delta(delta: i64) -> String {
    format!("{delta} bytes")
}

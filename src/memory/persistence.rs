//! 会话持久化（JSON 文件）
//!
//! 每个会话一个 JSON 文件：`<dir>/session_<id>.json`；文件不存在或损坏时视为空会话。
//! 写入先落临时文件再 rename，避免进程中断留下半截 JSON。

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use crate::memory::{SessionMemory, SessionSnapshot, DEFAULT_HISTORY_LIMIT};

/// 文件会话记忆：单目录，每会话一个 JSON
#[derive(Debug, Clone)]
pub struct FileSessionMemory {
    dir: PathBuf,
    history_limit: usize,
}

impl FileSessionMemory {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// 会话文件路径；ASCII 字母数字与 `-` 原样保留，其余字节（含 `_`）写成 `_xx` 十六进制，
    /// 不同 session_id 不会落到同一文件
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        let mut safe = String::with_capacity(session_id.len());
        for b in session_id.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' {
                safe.push(b as char);
            } else {
                safe.push_str(&format!("_{:02x}", b));
            }
        }
        self.dir.join(format!("session_{}.json", safe))
    }
}

#[async_trait]
impl SessionMemory for FileSessionMemory {
    async fn load(&self, session_id: &str) -> anyhow::Result<SessionSnapshot> {
        let path = self.session_path(session_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionSnapshot::default())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("read session file {}", path.display()))
            }
        };
        match serde_json::from_str::<SessionSnapshot>(&data) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "corrupt session file, starting fresh");
                Ok(SessionSnapshot::default())
            }
        }
    }

    async fn save(&self, session_id: &str, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create session dir {}", self.dir.display()))?;

        let mut stored = snapshot.clone();
        stored.history.prune(self.history_limit);
        let json = serde_json::to_string_pretty(&stored)?;

        let path = self.session_path(session_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("rename into {}", path.display()))?;
        Ok(())
    }

    fn history_limit(&self) -> usize {
        self.history_limit
    }
}

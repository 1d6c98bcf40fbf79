//! 本地键值存储 - keyless application identifier 持久化
//!
//! 仅存一个键：服务端签发的 keyless application identifier。
//! 显式 identifier 出现或存储的 identifier 被消费取代后删除。

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::error::{InboxError, InboxResult};

/// keyless identifier 的存储键
pub const KEYLESS_STORAGE_KEY: &str = "inbox_keyless_application_identifier";

/// 服务端签发的 keyless 凭证前缀，只有带此前缀的 identifier 才会持久化
pub const KEYLESS_PREFIX: &str = "keyless_";

/// 键值存储抽象
///
/// 浏览器环境对应 localStorage；这里提供内存与文件两种实现。
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> InboxResult<()>;
    fn remove(&self, key: &str) -> InboxResult<()>;
}

/// 内存实现（测试与一次性进程用）
#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> InboxResult<()> {
        self.map
            .lock()
            .map_err(|_| InboxError::Storage("storage lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> InboxResult<()> {
        self.map
            .lock()
            .map_err(|_| InboxError::Storage("storage lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

/// 文件实现 - JSON 文件加独占锁读写
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// 默认存储路径：`~/.config/inbox-sync/storage.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("inbox-sync")
            .join("storage.json")
    }

    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_map(&self) -> HashMap<String, String> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Storage file corrupted, starting empty");
                HashMap::new()
            }
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> InboxResult<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| InboxError::Storage(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| InboxError::Storage(e.to_string()))?;

        file.lock_exclusive()
            .map_err(|e| InboxError::Storage(e.to_string()))?;
        let mut file = file;
        let json =
            serde_json::to_string_pretty(map).map_err(|e| InboxError::Storage(e.to_string()))?;
        let result = file
            .write_all(json.as_bytes())
            .map_err(|e| InboxError::Storage(e.to_string()));
        let _ = file.unlock();
        result
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.read_map().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> InboxResult<()> {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> InboxResult<()> {
        let mut map = self.read_map();
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

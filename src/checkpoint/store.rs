//! Checkpoint 存储
//!
//! 约定：同一个 runId 只有一个写入者（编排进程），存储本身不做多写者协调；
//! 并发读取总是安全的。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::checkpoint::migration;
use crate::error::{BenchError, BenchResult};
use crate::models::Checkpoint;

const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Checkpoint 存储能力
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取 checkpoint；不存在时返回 `None`，损坏时返回 `CheckpointCorrupt`
    async fn load(&self, run_id: &str) -> BenchResult<Option<Checkpoint>>;

    /// 原子写入完整 checkpoint，覆盖同一 runId 的旧记录
    async fn save(&self, checkpoint: &Checkpoint) -> BenchResult<()>;

    async fn exists(&self, run_id: &str) -> BenchResult<bool>;

    /// 列出所有已持久化的运行（无序）
    async fn list_runs(&self) -> BenchResult<Vec<String>>;

    /// 幂等删除；删除不存在的运行不是错误
    async fn delete(&self, run_id: &str) -> BenchResult<()>;
}

/// runId 会作为目录名使用，只允许安全字符
pub fn validate_run_id(run_id: &str) -> BenchResult<()> {
    let valid = !run_id.is_empty()
        && !run_id.starts_with('.')
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(BenchError::Config(format!("runId 不合法: {:?}", run_id)))
    }
}

// ========== 文件存储 ==========

/// 文件系统存储：`<root>/<runId>/checkpoint.json`
///
/// 写入流程：临时文件 → fsync → rename → fsync 目录，
/// 读者要么看到迁移前的完整文件，要么看到迁移后的完整文件。
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 运行目录（报告等派生文件也写在这里）
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn checkpoint_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(CHECKPOINT_FILE)
    }
}

/// 原子写文件
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> BenchResult<()> {
    let path_str = path.display().to_string();
    let parent = path
        .parent()
        .ok_or_else(|| BenchError::Config(format!("路径没有父目录: {}", path_str)))?;

    fs::create_dir_all(parent)
        .await
        .map_err(|e| BenchError::store(parent.display().to_string(), e))?;

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        chrono::Utc::now().timestamp_micros()
    ));

    let write_result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp).await;
        return Err(BenchError::store(path_str, e));
    }

    // rename 本身的持久化依赖目录 fsync，部分平台不支持对目录 fsync
    match fs::File::open(parent).await {
        Ok(dir) => {
            if let Err(e) = dir.sync_all().await {
                debug!("目录 fsync 失败 {}: {}", parent.display(), e);
            }
        }
        Err(e) => debug!("无法打开目录以 fsync {}: {}", parent.display(), e),
    }

    Ok(())
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, run_id: &str) -> BenchResult<Option<Checkpoint>> {
        validate_run_id(run_id)?;
        let path = self.checkpoint_path(run_id);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BenchError::store(path.display().to_string(), e)),
        };

        debug!("读取 checkpoint: {} ({} 字节)", path.display(), bytes.len());
        migration::decode(run_id, &bytes).map(Some)
    }

    async fn save(&self, checkpoint: &Checkpoint) -> BenchResult<()> {
        validate_run_id(checkpoint.run_id())?;
        let bytes = migration::encode(checkpoint)?;
        atomic_write(&self.checkpoint_path(checkpoint.run_id()), &bytes).await
    }

    async fn exists(&self, run_id: &str) -> BenchResult<bool> {
        validate_run_id(run_id)?;
        let path = self.checkpoint_path(run_id);
        fs::try_exists(&path)
            .await
            .map_err(|e| BenchError::store(path.display().to_string(), e))
    }

    async fn list_runs(&self) -> BenchResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BenchError::store(self.root.display().to_string(), e)),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BenchError::store(self.root.display().to_string(), e))?
        {
            let path = entry.path();
            let checkpoint = path.join(CHECKPOINT_FILE);
            match fs::metadata(&checkpoint).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    debug!("跳过无法访问的目录 {}: {}", path.display(), e);
                    continue;
                }
            }
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                runs.push(name.to_string());
            }
        }

        Ok(runs)
    }

    async fn delete(&self, run_id: &str) -> BenchResult<()> {
        validate_run_id(run_id)?;
        let dir = self.run_dir(run_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BenchError::store(dir.display().to_string(), e)),
        }
    }
}

// ========== 内存存储 ==========

/// 内存存储，保存序列化后的字节，行为与文件存储一致
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入原始字节（用于模拟损坏的记录）
    pub async fn put_raw(&self, run_id: &str, bytes: Vec<u8>) {
        self.records.lock().await.insert(run_id.to_string(), bytes);
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, run_id: &str) -> BenchResult<Option<Checkpoint>> {
        let records = self.records.lock().await;
        match records.get(run_id) {
            None => Ok(None),
            Some(bytes) => migration::decode(run_id, bytes).map(Some),
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> BenchResult<()> {
        let bytes = migration::encode(checkpoint)?;
        self.records
            .lock()
            .await
            .insert(checkpoint.run_id().to_string(), bytes);
        Ok(())
    }

    async fn exists(&self, run_id: &str) -> BenchResult<bool> {
        Ok(self.records.lock().await.contains_key(run_id))
    }

    async fn list_runs(&self) -> BenchResult<Vec<String>> {
        Ok(self.records.lock().await.keys().cloned().collect())
    }

    async fn delete(&self, run_id: &str) -> BenchResult<()> {
        self.records.lock().await.remove(run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkQuestion, PhaseState, Run, RunConfigSnapshot};

    fn checkpoint(run_id: &str) -> Checkpoint {
        let run = Run::new(run_id, "local", "longmemeval", "openai", RunConfigSnapshot::default());
        let q = BenchmarkQuestion {
            question_id: "q1".to_string(),
            question_type: "multi-session".to_string(),
            question: "?".to_string(),
            answer: "!".to_string(),
            question_date: None,
            sessions: Vec::new(),
        };
        Checkpoint::new(run, &[q]).unwrap()
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("runs"));

        assert!(store.load("r1").await.unwrap().is_none());
        assert!(!store.exists("r1").await.unwrap());

        let mut cp = checkpoint("r1");
        store.save(&cp).await.unwrap();
        assert!(store.exists("r1").await.unwrap());
        assert_eq!(store.load("r1").await.unwrap(), Some(cp.clone()));

        // 覆盖写
        cp.questions.get_mut("q1").unwrap().state = PhaseState::Failed {
            phase: crate::models::Phase::Ingest,
            reason: "x".to_string(),
        };
        store.save(&cp).await.unwrap();
        assert_eq!(store.load("r1").await.unwrap(), Some(cp));

        // 目录下不应残留临时文件
        let leftovers: Vec<_> = std::fs::read_dir(store.run_dir("r1"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("runs"));

        assert!(store.list_runs().await.unwrap().is_empty());

        store.save(&checkpoint("r1")).await.unwrap();
        store.save(&checkpoint("r2")).await.unwrap();
        // 没有 checkpoint 的目录不算运行
        std::fs::create_dir_all(dir.path().join("runs").join("stray")).unwrap();

        let mut runs = store.list_runs().await.unwrap();
        runs.sort();
        assert_eq!(runs, vec!["r1".to_string(), "r2".to_string()]);

        store.delete("r1").await.unwrap();
        store.delete("r1").await.unwrap();
        store.delete("never-existed").await.unwrap();
        assert_eq!(store.list_runs().await.unwrap(), vec!["r2".to_string()]);
    }

    #[tokio::test]
    async fn test_list_runs_ignores_files_and_nested_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("runs");
        let store = FileCheckpointStore::new(&root);
        store.save(&checkpoint("r1")).await.unwrap();

        // 根目录下的普通文件与 checkpoint 同名的目录都不是运行
        std::fs::write(root.join("notes.txt"), b"x").unwrap();
        std::fs::create_dir_all(root.join("odd").join(CHECKPOINT_FILE)).unwrap();

        assert_eq!(store.list_runs().await.unwrap(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        atomic_write(&path, b"first").await.unwrap();
        atomic_write(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_surfaces_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("r1")).unwrap();
        std::fs::write(dir.path().join("r1").join(CHECKPOINT_FILE), b"{\"schemaVersion\": 2,").unwrap();

        let err = store.load("r1").await.unwrap_err();
        assert!(matches!(err, BenchError::CheckpointCorrupt { .. }));
    }

    #[tokio::test]
    async fn test_invalid_run_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load("../escape").await.is_err());
        assert!(store.delete(".hidden").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_behaves_like_file_store() {
        let store = MemoryCheckpointStore::new();
        let cp = checkpoint("r1");
        store.save(&cp).await.unwrap();
        assert_eq!(store.load("r1").await.unwrap(), Some(cp));

        store.put_raw("r2", b"not json".to_vec()).await;
        assert!(matches!(
            store.load("r2").await.unwrap_err(),
            BenchError::CheckpointCorrupt { .. }
        ));

        store.delete("r1").await.unwrap();
        store.delete("r1").await.unwrap();
        assert!(!store.exists("r1").await.unwrap());
    }
}

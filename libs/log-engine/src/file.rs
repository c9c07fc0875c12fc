use std::future::Future;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tokio::sync::Mutex;

use logscope_api::{AppendRecord, InspectError, LogBroker, PartitionInfo, RawRecord, TopicInfo, now_ms};

const LOG_SUFFIX: &str = ".jsonl";
/// Размер блока при чтении файла с конца.
const TAIL_CHUNK: u64 = 8 * 1024;

// ════════════════════════════════════════════════════════════════
//  On-disk record format
// ════════════════════════════════════════════════════════════════

/// Одна строка `<data_dir>/<topic>/<partition>.jsonl`. Байты в base64.
#[derive(serde::Serialize, serde::Deserialize)]
struct DiskRecord {
    offset: u64,
    ts_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    headers: Vec<(String, String)>,
}

impl DiskRecord {
    fn from_append(offset: u64, record: &AppendRecord) -> Self {
        Self {
            offset,
            ts_ms: record.timestamp_ms.unwrap_or_else(now_ms),
            key: record.key.as_deref().map(|k| B64.encode(k)),
            value: record.value.as_deref().map(|v| B64.encode(v)),
            headers: record
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), B64.encode(value)))
                .collect(),
        }
    }

    fn into_raw(self, partition: u32) -> Result<RawRecord, String> {
        let offset = self.offset;
        let decode = |field: &str, data: String| {
            B64.decode(data)
                .map_err(|e| format!("offset {offset}: bad base64 in {field}: {e}"))
        };
        let key = self.key.map(|k| decode("key", k)).transpose()?;
        let value = self.value.map(|v| decode("value", v)).transpose()?;
        let headers = self
            .headers
            .into_iter()
            .map(|(name, data)| Ok((name, decode("header", data)?)))
            .collect::<Result<Vec<_>, String>>()?;
        Ok(RawRecord {
            partition,
            offset,
            timestamp_ms: self.ts_ms,
            key,
            value,
            headers,
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  FileBroker
// ════════════════════════════════════════════════════════════════

/// Broker поверх каталога JSONL-файлов: topic = подкаталог,
/// partition = файл `<id>.jsonl`.
///
/// Чтения идут без блокировки; append'ы сериализуются одним mutex'ом,
/// чтобы offset'ы назначались без гонок.
pub struct FileBroker {
    data_dir: PathBuf,
    append_lock: Mutex<()>,
}

impl FileBroker {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Создать каталог topic'а и пустые файлы партиций. Существующие файлы не трогаются.
    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<(), InspectError> {
        let dir = self.topic_dir(name).ok_or_else(|| InspectError::config(format!("invalid topic name '{name}'")))?;
        std::fs::create_dir_all(&dir)?;
        for id in 0..partitions {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(format!("{id}{LOG_SUFFIX}")))?;
        }
        Ok(())
    }

    /// Имя topic'а — один сегмент пути, без `.`/`..` и разделителей.
    fn topic_dir(&self, topic: &str) -> Option<PathBuf> {
        let valid = !topic.is_empty() && topic != "." && topic != ".." && !topic.contains(['/', '\\']);
        valid.then(|| self.data_dir.join(topic))
    }

    fn partition_path(&self, topic: &str, partition: u32) -> Result<PathBuf, InspectError> {
        let dir = self
            .topic_dir(topic)
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| InspectError::TopicNotFound(topic.to_string()))?;
        let path = dir.join(format!("{partition}{LOG_SUFFIX}"));
        if !path.is_file() {
            return Err(InspectError::PartitionNotFound {
                topic: topic.to_string(),
                partition: partition.into(),
            });
        }
        Ok(path)
    }

    // ── Directory ──

    fn do_topics(&self) -> Result<Vec<String>, InspectError> {
        let dir = match std::fs::read_dir(&self.data_dir) {
            Ok(d) => d,
            Err(_) => return Ok(Vec::new()),
        };
        let mut names: Vec<String> = dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    fn do_lookup(&self, topic: &str) -> Result<Option<TopicInfo>, InspectError> {
        let Some(dir) = self.topic_dir(topic).filter(|dir| dir.is_dir()) else {
            return Ok(None);
        };

        let mut ids: Vec<u32> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                name.to_string_lossy().strip_suffix(LOG_SUFFIX)?.parse().ok()
            })
            .collect();
        ids.sort_unstable();

        let mut partitions = Vec::with_capacity(ids.len());
        for id in ids {
            partitions.push(partition_info(&dir.join(format!("{id}{LOG_SUFFIX}")), id)?);
        }
        Ok(Some(TopicInfo {
            name: topic.to_string(),
            partitions,
        }))
    }

    // ── Read ──

    fn do_fetch(&self, topic: &str, partition: u32, offset: u64, max: usize) -> Result<Vec<RawRecord>, InspectError> {
        let path = self.partition_path(topic, partition)?;
        let mut f = File::open(&path)?;
        let start = seek_offset(&mut f, offset)?;
        f.seek(SeekFrom::Start(start))?;
        let reader = BufReader::new(f);

        let mut result = Vec::new();
        for line in reader.lines() {
            if result.len() >= max {
                break;
            }
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = match serde_json::from_str::<DiskRecord>(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt log line");
                    continue;
                }
            };
            if record.offset < offset {
                continue;
            }
            match record.into_raw(partition) {
                Ok(raw) => result.push(raw),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping corrupt log line"),
            }
        }
        Ok(result)
    }

    // ── Append ──

    fn do_append(&self, topic: &str, partition: u32, record: &AppendRecord) -> Result<u64, InspectError> {
        let path = self.partition_path(topic, partition)?;
        let mut f = std::fs::OpenOptions::new().read(true).append(true).open(&path)?;

        let offset = last_offset(&mut f, &path)?.map_or(0, |last| last + 1);

        let mut line = String::new();
        // Недописанная строка без '\n' не должна склеиться с новой записью.
        if !ends_with_newline(&mut f)? {
            line.push('\n');
        }
        line.push_str(
            &serde_json::to_string(&DiskRecord::from_append(offset, record))
                .map_err(|e| InspectError::broker(format!("json serialize: {e}")))?,
        );
        line.push('\n');
        f.write_all(line.as_bytes())?;
        Ok(offset)
    }
}

impl LogBroker for FileBroker {
    fn topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, InspectError>> + Send + '_>> {
        Box::pin(async move { self.do_topics() })
    }

    fn lookup_topic(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TopicInfo>, InspectError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move { self.do_lookup(&topic) })
    }

    fn fetch(
        &self,
        topic: &str,
        partition: u32,
        offset: u64,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, InspectError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move { self.do_fetch(&topic, partition, offset, max) })
    }

    fn append(
        &self,
        topic: &str,
        partition: u32,
        record: AppendRecord,
    ) -> Pin<Box<dyn Future<Output = Result<u64, InspectError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let _guard = self.append_lock.lock().await;
            self.do_append(&topic, partition, &record)
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

/// first offset = offset первой читаемой строки, high-water = offset
/// последней читаемой + 1.
fn partition_info(path: &Path, id: u32) -> Result<PartitionInfo, InspectError> {
    let mut f = File::open(path)?;
    let Some(last) = last_offset(&mut f, path)? else {
        return Ok(PartitionInfo {
            id,
            first_offset: 0,
            high_watermark: 0,
        });
    };
    let high_watermark = last + 1;
    let first_offset = line_at(&mut f, 0)?.map_or(high_watermark, |line| line.offset);

    Ok(PartitionInfo {
        id,
        first_offset,
        high_watermark,
    })
}

/// Offset последней читаемой строки. Битый хвост (строка, недописанная
/// при падении) пропускается с warn.
fn last_offset(f: &mut File, path: &Path) -> Result<Option<u64>, InspectError> {
    let mut lines = ReverseLines::new(f)?;
    while let Some(line) = lines.next_line()? {
        match parse_offset(&line) {
            Ok(offset) => return Ok(Some(offset)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping corrupt log line at tail"),
        }
    }
    Ok(None)
}

fn ends_with_newline(f: &mut File) -> Result<bool, InspectError> {
    let len = f.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(true);
    }
    f.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Непустые строки файла от конца к началу, чтение блоками по `TAIL_CHUNK`.
struct ReverseLines<'f> {
    file: &'f mut File,
    /// Всё до `pos` ещё не прочитано.
    pos: u64,
    /// Прочитанные, но ещё не отданные байты: `[pos, начало последней отданной строки)`.
    pending: Vec<u8>,
}

impl<'f> ReverseLines<'f> {
    fn new(file: &'f mut File) -> std::io::Result<Self> {
        let pos = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file,
            pos,
            pending: Vec::new(),
        })
    }

    fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(nl) = self.pending.iter().rposition(|b| *b == b'\n') {
                let line = self.pending.split_off(nl + 1);
                self.pending.truncate(nl);
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(line));
            }
            if self.pos == 0 {
                let line = std::mem::take(&mut self.pending);
                return Ok((!line.iter().all(u8::is_ascii_whitespace)).then_some(line));
            }
            let step = self.pos.min(TAIL_CHUNK);
            self.pos -= step;
            self.file.seek(SeekFrom::Start(self.pos))?;
            let mut chunk = vec![0u8; step as usize];
            self.file.read_exact(&mut chunk)?;
            chunk.extend_from_slice(&self.pending);
            self.pending = chunk;
        }
    }
}

/// Читаемая строка: байт сразу после её `\n` и offset записи.
struct LineAt {
    end: u64,
    offset: u64,
}

/// Первая читаемая строка, начинающаяся не раньше байта `from`.
fn line_at(f: &mut File, from: u64) -> Result<Option<LineAt>, InspectError> {
    let mut pos = from.saturating_sub(1);
    f.seek(SeekFrom::Start(pos))?;
    let mut reader = BufReader::new(&mut *f);
    let mut buf = Vec::new();
    if from > 0 {
        // дочитать строку, в середину которой попали
        pos += reader.read_until(b'\n', &mut buf)? as u64;
    }
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)? as u64;
        if n == 0 {
            return Ok(None);
        }
        pos += n;
        if let Ok(offset) = parse_offset(&buf) {
            return Ok(Some(LineAt { end: pos, offset }));
        }
    }
}

/// Байтовая позиция, с которой надо читать, чтобы встретить `target`.
///
/// Offset'ы в файле строго возрастают, поэтому это бинарный поиск по
/// байтам: O(log size) проб вместо разбора всего файла на каждый fetch.
/// Результат — начало строки не позже первой с offset >= `target`.
fn seek_offset(f: &mut File, target: u64) -> Result<u64, InspectError> {
    let mut lo = 0;
    let mut hi = f.seek(SeekFrom::End(0))?;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match line_at(f, mid)? {
            Some(line) if line.offset < target => {
                lo = line.end;
                hi = hi.max(lo);
            }
            _ => hi = mid,
        }
    }
    Ok(lo)
}

/// Быстро извлечь offset из JSON-строки без полной десериализации.
fn parse_offset(line: &[u8]) -> Result<u64, serde_json::Error> {
    #[derive(serde::Deserialize)]
    struct OffsetOnly {
        offset: u64,
    }
    serde_json::from_slice::<OffsetOnly>(line).map(|o| o.offset)
}

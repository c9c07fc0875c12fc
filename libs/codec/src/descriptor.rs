use std::path::{Path, PathBuf};

use logscope_api::InspectError;

const DESC_SUFFIX: &str = ".desc";

/// Резолвит имя descriptor-файла из запроса в путь внутри настроенного каталога.
///
/// Вход приходит от пользователя. Результат всегда прямой потомок `directory`:
/// от входа остаётся только последний сегмент пути, из него вычищаются
/// `.`, `/` и `\`, затем добавляется обязательный суффикс `.desc`.
/// Один и тот же sanitizer используется на decode и на encode.
#[derive(Debug, Clone)]
pub struct DescriptorResolver {
    directory: PathBuf,
}

impl DescriptorResolver {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, InspectError> {
        let stem = sanitize_stem(name).ok_or_else(|| {
            InspectError::config(format!("descriptor file name '{name}' is empty after sanitization"))
        })?;
        Ok(self.directory.join(format!("{stem}{DESC_SUFFIX}")))
    }

    /// Имена `.desc` файлов каталога, отсортированы. Нет каталога — пустой список.
    pub fn list(&self) -> Vec<String> {
        let dir = match std::fs::read_dir(&self.directory) {
            Ok(d) => d,
            Err(_) => return Vec::new(),
        };

        let mut files: Vec<String> = dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(DESC_SUFFIX))
            .collect();
        files.sort();
        files
    }

    /// Descriptor, имя которого совпадает с именем topic'а (для предвыбора).
    pub fn default_for_topic(&self, topic: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|name| name.strip_suffix(DESC_SUFFIX) == Some(topic))
    }
}

fn sanitize_stem(name: &str) -> Option<String> {
    let segment = name.rsplit(['/', '\\']).next().unwrap_or("");
    let segment = segment.strip_suffix(DESC_SUFFIX).unwrap_or(segment);
    let stem: String = segment
        .chars()
        .filter(|c| !matches!(c, '.' | '/' | '\\'))
        .collect();
    if stem.is_empty() { None } else { Some(stem) }
}

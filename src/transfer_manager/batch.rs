use serde::{Deserialize, Serialize};

/// 上报给宿主的最小文件描述，内容以 base64 携带。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub content_base64: String,
}

/// 未绑定记录标识时，跨多次处理累积的文件描述。只追加，显式清空。
#[derive(Clone, Debug, Default)]
pub struct CumulativeBatch {
    entries: Vec<FileDescriptor>,
}

impl CumulativeBatch {
    pub fn append(&mut self, descriptors: impl IntoIterator<Item = FileDescriptor>) {
        self.entries.extend(descriptors);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[FileDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

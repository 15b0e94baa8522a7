use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub status: u16,
    #[serde(default)]
    pub sid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Folder {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FolderListResponse {
    pub status: u16,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadedDocument {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentAddResponse {
    pub status: u16,
    #[serde(default)]
    pub uploaded: Vec<UploadedDocument>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentPart {
    pub id: u64,
    #[serde(default)]
    pub score: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Document {
    /// 1 while the service is still processing the upload.
    #[serde(default)]
    pub is_pending: u8,
    #[serde(default)]
    pub parts: Vec<DocumentPart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentGetResponse {
    pub status: u16,
    #[serde(default)]
    pub documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportSource {
    #[serde(default)]
    pub linkurl: Option<String>,
    #[serde(default)]
    pub percent: u32,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub collection: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportSourcesResponse {
    pub status: u16,
    #[serde(default)]
    pub sources: Vec<ReportSource>,
}

//! `RemoteFs` backed by a real device.

use std::collections::HashMap;

use mchfuse_client::{ClientResult, Device, RemoteFile};

use crate::filesystem::RemoteFs;

#[async_trait::async_trait]
impl RemoteFs for Device {
    async fn root(&self) -> ClientResult<RemoteFile> {
        Device::root(self).await
    }

    async fn refresh(&self, file: &RemoteFile) -> ClientResult<RemoteFile> {
        self.file_by_id(&file.id).await
    }

    async fn list_directory(&self, dir: &RemoteFile) -> ClientResult<HashMap<String, RemoteFile>> {
        Device::list_directory(self, dir).await
    }

    async fn lookup_directory(
        &self,
        dir: &RemoteFile,
        name: &str,
    ) -> ClientResult<Option<RemoteFile>> {
        Device::lookup_directory(self, dir, name).await
    }

    async fn create_file(&self, parent: &RemoteFile, name: &str) -> ClientResult<RemoteFile> {
        Device::create_file(self, parent, name).await
    }

    async fn create_directory(&self, parent: &RemoteFile, name: &str) -> ClientResult<RemoteFile> {
        Device::create_directory(self, parent, name).await
    }

    async fn delete(&self, file: &RemoteFile) -> ClientResult<()> {
        Device::delete(self, file).await
    }

    async fn rename(
        &self,
        file: &RemoteFile,
        new_parent: &RemoteFile,
        new_name: &str,
    ) -> ClientResult<()> {
        Device::rename(self, file, new_parent, new_name).await
    }

    async fn set_meta(&self, file: &RemoteFile, changes: serde_json::Value) -> ClientResult<()> {
        Device::set_meta(self, file, changes).await
    }

    async fn read(&self, file: &RemoteFile, dest: &mut [u8], offset: u64) -> ClientResult<usize> {
        Device::read(self, file, dest, offset).await
    }

    async fn write(&self, file: &RemoteFile, data: &[u8], offset: u64) -> ClientResult<()> {
        Device::write(self, file, data, offset).await
    }

    async fn truncate(&self, file: &RemoteFile, offset: u64) -> ClientResult<()> {
        Device::truncate(self, file, offset).await
    }
}

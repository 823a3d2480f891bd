//! Update Protocol Engine
//!
//! Answers "should this device update, and to what?" from the registry and
//! the blob store, and applies registry mutations.
//!
//! Version comparison is exact string equality: any reported version other
//! than the desired one is told to move to the registered image. Registration
//! does not check the blob store, so a record may name an image that has not
//! been uploaded yet; checks during that window fail with
//! [`FotaError::FirmwareFileMissing`] and devices are expected to retry.

use futures_util::Stream;
use std::fmt::Display;
use std::path::Path;
use tracing::{info, warn};

use super::blobs::{BlobError, BlobStore};
use super::error::{FotaError, Result};
use super::records;
use super::registry::{DeviceRecord, RegistryStore};
use super::upload::{read_bounded, UploadLimits};

/// Query parameter carrying the device's running firmware version.
pub const VERSION_PARAM: &str = "app_ver";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    NoUpdateAvailable,
    UpdateAvailable { firmware_ref: String },
}

pub struct UpdateEngine {
    registry: RegistryStore,
    blobs: BlobStore,
    limits: UploadLimits,
}

impl UpdateEngine {
    pub fn new(registry: RegistryStore, blobs: BlobStore, limits: UploadLimits) -> Self {
        Self {
            registry,
            blobs,
            limits,
        }
    }

    /// Open the registry and blob directory under `data_dir`.
    pub fn open(data_dir: &Path, limits: UploadLimits) -> Result<Self> {
        let registry = RegistryStore::open(&data_dir.join("devices.db"))?;
        let blobs = BlobStore::open(&data_dir.join("files"))?;
        Ok(Self::new(registry, blobs, limits))
    }

    pub async fn check_for_update(
        &self,
        device_id: &str,
        reported_version: &str,
    ) -> Result<UpdateDecision> {
        info!(device_id, reported_version, "update check");

        let record = self
            .registry
            .get(device_id)?
            .ok_or_else(|| FotaError::DeviceNotFound(device_id.to_string()))?;

        if record.desired_version == reported_version {
            return Ok(UpdateDecision::NoUpdateAvailable);
        }

        let present = match self.blobs.exists(&record.firmware_ref).await {
            Ok(present) => present,
            // A reference that can never name a stored file is as missing as an absent one
            Err(BlobError::InvalidReference(_)) => false,
            Err(e) => return Err(e.into()),
        };

        if !present {
            warn!(
                device_id,
                firmware_ref = %record.firmware_ref,
                "registry references a firmware image that is not stored"
            );
            return Err(FotaError::FirmwareFileMissing(record.firmware_ref));
        }

        info!(
            device_id,
            from = reported_version,
            to = %record.desired_version,
            "update available"
        );
        Ok(UpdateDecision::UpdateAvailable {
            firmware_ref: record.firmware_ref,
        })
    }

    /// Every registry row, in whatever order the store yields them.
    pub fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.registry.list_all()?)
    }

    pub fn register_device(
        &self,
        device_id: &str,
        desired_version: &str,
        firmware_ref: &str,
    ) -> Result<()> {
        if device_id.is_empty() || desired_version.is_empty() || firmware_ref.is_empty() {
            return Err(FotaError::malformed("device record fields must be non-empty"));
        }

        self.registry.put(&DeviceRecord::new(device_id, desired_version, firmware_ref))?;
        info!(device_id, desired_version, firmware_ref, "device registered");
        Ok(())
    }

    /// Referenced firmware images are never removed here.
    pub fn deregister_device(&self, device_id: &str) -> Result<()> {
        if !self.registry.delete(device_id)? {
            warn!(device_id, "deregistration of unknown device");
            return Err(FotaError::DeviceNotFound(device_id.to_string()));
        }
        info!(device_id, "device deregistered");
        Ok(())
    }

    /// Read one CSV record from an upload body and register it.
    ///
    /// The record's own device id is authoritative; `path_device_id` only
    /// identifies the request.
    pub async fn import_record<S, B, E>(
        &self,
        path_device_id: &str,
        body: S,
        declared_len: u64,
    ) -> Result<DeviceRecord>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        self.check_declared(declared_len)?;

        let mut buf = Vec::new();
        read_bounded(body, declared_len, &mut buf, self.limits.timeout).await?;

        let text = std::str::from_utf8(&buf)
            .map_err(|_| FotaError::malformed("record body is not valid UTF-8"))?;
        let record = records::parse_record(text)?;

        if record.device_id != path_device_id {
            warn!(
                path_device_id,
                record_device_id = %record.device_id,
                "record device id differs from request path"
            );
        }

        self.register_device(&record.device_id, &record.desired_version, &record.firmware_ref)?;
        Ok(record)
    }

    pub async fn upload_firmware<S, B, E>(
        &self,
        firmware_ref: &str,
        body: S,
        declared_len: u64,
    ) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        self.check_declared(declared_len)?;
        info!(firmware_ref, expected = declared_len, "receiving firmware image");

        let written = self
            .blobs
            .write(firmware_ref, body, declared_len, self.limits.timeout)
            .await?;
        Ok(written)
    }

    pub async fn download_firmware(&self, firmware_ref: &str) -> Result<Vec<u8>> {
        let bytes = self.blobs.read(firmware_ref).await.map_err(|e| {
            if let BlobError::NotFound(_) = e {
                warn!(firmware_ref, "download of missing firmware image");
            }
            FotaError::from(e)
        })?;
        Ok(bytes)
    }

    fn check_declared(&self, declared_len: u64) -> Result<()> {
        if self.limits.allows(declared_len) {
            Ok(())
        } else {
            Err(FotaError::malformed(format!(
                "declared length {} exceeds limit of {} bytes",
                declared_len, self.limits.max_bytes
            )))
        }
    }
}

/// Pull exactly one non-empty [`VERSION_PARAM`] value out of the query pairs.
pub fn reported_version(params: &[(String, String)]) -> Result<&str> {
    let mut values = params
        .iter()
        .filter(|(key, _)| key == VERSION_PARAM)
        .map(|(_, value)| value.as_str());

    match (values.next(), values.next()) {
        (Some(version), None) if !version.is_empty() => Ok(version),
        (None, _) => Err(FotaError::malformed("missing app_ver")),
        _ => Err(FotaError::malformed("app_ver must have exactly one value")),
    }
}

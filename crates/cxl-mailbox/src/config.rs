use serde::{Deserialize, Serialize};

use crate::backend::{DeviceIdentity, RamBackend};
use crate::dcd::{Region, MAX_DC_BLOCKS};
use crate::error::{ConfigError, Result};
use crate::{CACHE_LINE_SIZE, CAPACITY_MULTIPLIER, MAX_PAYLOAD_SIZE};

/// Maximum number of dynamic capacity regions a device may expose.
pub const MAX_DC_REGIONS: usize = 8;

const MIN_PAYLOAD_SIZE: usize = 256;
const MAX_PAYLOAD_LIMIT: usize = 1 << 20;

/// One dynamic capacity region. Bases are assigned when the device is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Usable length in bytes.
    pub len: u64,
    pub block_size: u64,
    pub dsmad_handle: u32,
    pub flags: u8,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            len: CAPACITY_MULTIPLIER,
            block_size: 2 * 1024 * 1024,
            dsmad_handle: 0,
            flags: 0,
        }
    }
}

/// Memory expansion device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryDeviceConfig {
    pub identity: DeviceIdentity,
    /// Static volatile capacity in bytes.
    pub volatile_capacity: u64,
    /// Static persistent capacity in bytes.
    pub persistent_capacity: u64,
    /// Label storage area size in bytes.
    pub lsa_size: u64,
    pub payload_max: usize,
    pub regions: Vec<RegionConfig>,
}

impl Default for MemoryDeviceConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity {
                vendor_id: 0x8086,
                device_id: 0x0d93,
                subsystem_vendor_id: 0,
                subsystem_id: 0,
                serial: 0,
            },
            volatile_capacity: 0,
            persistent_capacity: CAPACITY_MULTIPLIER,
            lsa_size: 0,
            payload_max: MAX_PAYLOAD_SIZE,
            regions: Vec::new(),
        }
    }
}

impl MemoryDeviceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_payload_max(self.payload_max)?;
        if u32::try_from(self.lsa_size).is_err() {
            return Err(ConfigError::LsaTooLarge(self.lsa_size));
        }
        if self.regions.len() > MAX_DC_REGIONS {
            return Err(ConfigError::TooManyRegions {
                count: self.regions.len(),
                max: MAX_DC_REGIONS,
            });
        }
        for (index, region) in self.regions.iter().enumerate() {
            let bs = region.block_size;
            if bs < CACHE_LINE_SIZE || !bs.is_power_of_two() {
                return Err(ConfigError::InvalidBlockSize {
                    index,
                    block_size: bs,
                });
            }
            if region.len == 0 {
                return Err(ConfigError::EmptyRegion { index });
            }
            if region.len % bs != 0 {
                return Err(ConfigError::UnalignedRegion {
                    index,
                    len: region.len,
                    block_size: bs,
                });
            }
        }
        self.check_block_span()
    }

    /// Bounds the number of minimum-size blocks the laid-out regions span.
    fn check_block_span(&self) -> Result<()> {
        let Some(granule) = self.regions.iter().map(|r| r.block_size).min() else {
            return Ok(());
        };
        let mut span = 0u64;
        for (i, region) in self.regions.iter().enumerate() {
            let len = if i + 1 == self.regions.len() {
                region.len
            } else {
                round_up(region.len, CAPACITY_MULTIPLIER)
            };
            span = span.saturating_add(len);
        }
        let blocks = span / granule;
        if blocks > MAX_DC_BLOCKS {
            return Err(ConfigError::TooManyBlocks {
                blocks,
                max: MAX_DC_BLOCKS,
            });
        }
        Ok(())
    }

    /// Lays the configured regions out contiguously after static capacity.
    ///
    /// Each region's decode length is its length rounded up to the 256MiB
    /// capacity multiplier, so every base stays multiplier aligned.
    pub fn layout_regions(&self, static_capacity: u64) -> Result<Vec<Region>> {
        self.validate()?;
        let mut base = round_up(static_capacity, CAPACITY_MULTIPLIER);
        let mut out = Vec::with_capacity(self.regions.len());
        for (index, region) in self.regions.iter().enumerate() {
            let decode_len = round_up(region.len, CAPACITY_MULTIPLIER);
            out.push(Region {
                base,
                decode_len,
                len: region.len,
                block_size: region.block_size,
                dsmad_handle: region.dsmad_handle,
                flags: region.flags,
            });
            base = base
                .checked_add(decode_len)
                .ok_or(ConfigError::RegionOrder {
                    prev: index,
                    index: index + 1,
                })?;
        }
        Ok(out)
    }

    /// Builds an in-memory backend sized from this configuration.
    pub fn ram_backend(&self) -> RamBackend {
        let dynamic: u64 = self
            .regions
            .iter()
            .map(|r| round_up(r.len, CAPACITY_MULTIPLIER))
            .sum();
        let static_capacity = self.volatile_capacity + self.persistent_capacity;
        let padding = round_up(static_capacity, CAPACITY_MULTIPLIER) - static_capacity;
        RamBackend::new(
            self.volatile_capacity,
            self.persistent_capacity,
            self.lsa_size as usize,
        )
        .with_dynamic_capacity(dynamic + padding)
    }
}

/// Switch CCI configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    pub identity: DeviceIdentity,
    /// Port the management interface is reached through.
    pub ingress_port: u8,
    pub payload_max: usize,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity {
                vendor_id: 0x19e5,
                device_id: 0xa128,
                subsystem_vendor_id: 0,
                subsystem_id: 0,
                serial: 0,
            },
            ingress_port: 0,
            payload_max: MAX_PAYLOAD_SIZE,
        }
    }
}

impl SwitchConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_payload_max(self.payload_max)
    }
}

fn validate_payload_max(size: usize) -> Result<()> {
    if !(MIN_PAYLOAD_SIZE..=MAX_PAYLOAD_LIMIT).contains(&size) {
        return Err(ConfigError::InvalidPayloadSize(size));
    }
    Ok(())
}

fn round_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align).saturating_mul(align)
}

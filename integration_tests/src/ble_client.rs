//! BLE client acting as the Central against a flashed Peripheral board.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::bleuuid::uuid_from_u16;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

/// Bridge channel UUIDs, 16-bit values on the Bluetooth base UUID
pub const TX_UUID: u16 = 0x0101;
pub const RX_UUID: u16 = 0x0102;
pub const SWI_UUID: u16 = 0x0103;
pub const SWO_UUID: u16 = 0x0104;
pub const SWCK_UUID: u16 = 0x0105;

pub const CHANNEL_UUIDS: [u16; 5] = [TX_UUID, RX_UUID, SWI_UUID, SWO_UUID, SWCK_UUID];

/// Service UUIDs
pub const UART_SERVICE_UUID: u16 = 0x0111;
pub const SWD_SERVICE_UUID: u16 = 0x0112;

/// Host-side Central connected to the Peripheral board.
pub struct BleClient {
    peripheral: Peripheral,
    tx_char: Characteristic,
    rx_char: Characteristic,
    /// RX notification bytes in arrival order
    notification_buffer: Arc<Mutex<Vec<u8>>>,
}

impl BleClient {
    /// Scan for a device by name, connect, discover and subscribe to RX.
    pub async fn connect_by_name(name: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter.start_scan(ScanFilter::default()).await?;
        let peripheral = Self::find_device_by_name(&adapter, name, scan_timeout).await?;
        adapter.stop_scan().await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let tx_char = Self::find_characteristic(&peripheral, TX_UUID)?;
        let rx_char = Self::find_characteristic(&peripheral, RX_UUID)?;

        peripheral.subscribe(&rx_char).await?;

        let notification_buffer = Arc::new(Mutex::new(Vec::new()));

        let buffer_clone = notification_buffer.clone();
        let peripheral_clone = peripheral.clone();
        let rx_uuid = uuid_from_u16(RX_UUID);
        tokio::spawn(async move {
            let mut stream = match peripheral_clone.notifications().await {
                Ok(s) => s,
                Err(_) => return,
            };

            while let Some(data) = stream.next().await {
                if data.uuid == rx_uuid {
                    let mut buf = buffer_clone.lock().await;
                    buf.extend_from_slice(&data.value);
                }
            }
        });

        Ok(Self {
            peripheral,
            tx_char,
            rx_char,
            notification_buffer,
        })
    }

    async fn find_device_by_name(adapter: &Adapter, name: &str, scan_timeout: Duration) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            for peripheral in adapter.peripherals().await? {
                if let Some(props) = peripheral.properties().await? {
                    // The shortened name may carry a trailing NUL
                    if props.local_name.as_deref().map(|n| n.trim_end_matches('\0')) == Some(name) {
                        return Ok(peripheral);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("Device '{}' not found within timeout", name))
    }

    fn find_characteristic(peripheral: &Peripheral, uuid: u16) -> Result<Characteristic> {
        let uuid = uuid_from_u16(uuid);
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| anyhow!("Characteristic {} not found", uuid))
    }

    /// All discovered characteristics as (service, characteristic) UUID pairs.
    pub fn discovered(&self) -> Vec<(Uuid, Uuid)> {
        self.peripheral
            .characteristics()
            .into_iter()
            .map(|c| (c.service_uuid, c.uuid))
            .collect()
    }

    /// Write bytes to the TX channel, one write per byte as the bridge does.
    pub async fn write_tx(&self, data: &[u8]) -> Result<()> {
        for byte in data {
            self.peripheral
                .write(&self.tx_char, &[*byte], WriteType::WithoutResponse)
                .await?;
        }
        Ok(())
    }

    /// Write bytes to another channel with a single write.
    pub async fn write_channel(&self, uuid: u16, data: &[u8]) -> Result<()> {
        let characteristic = Self::find_characteristic(&self.peripheral, uuid)?;
        self.peripheral
            .write(&characteristic, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    /// Wait until `len` notification bytes arrived, then take them.
    pub async fn read_notifications(&self, len: usize, wait: Duration) -> Result<Vec<u8>> {
        let result = timeout(wait, async {
            loop {
                {
                    let mut buf = self.notification_buffer.lock().await;
                    if buf.len() >= len {
                        return buf.drain(..len).collect::<Vec<u8>>();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        match result {
            Ok(data) => Ok(data),
            Err(_) => {
                let buf = self.notification_buffer.lock().await;
                Err(anyhow!(
                    "Timeout waiting for {} notification bytes, got {}: {:02x?}",
                    len,
                    buf.len(),
                    *buf
                ))
            }
        }
    }

    /// Take whatever notification bytes arrived so far.
    pub async fn take_notifications(&self) -> Vec<u8> {
        let mut buf = self.notification_buffer.lock().await;
        std::mem::take(&mut *buf)
    }

    pub async fn clear_buffer(&self) {
        self.notification_buffer.lock().await.clear();
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.unsubscribe(&self.rx_char).await?;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

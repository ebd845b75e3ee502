//! OTA receiver ESP32 firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    use esp32_nimble::BLEDevice;
    use ota_rs_esp32::ble::OtaService;
    use ota_rs_esp32::config::OtaConfig;
    use ota_rs_esp32::storage::EspOtaWriter;
    use std::time::Duration;

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== OTA receiver starting ===");

    let config = OtaConfig::default();
    let device = BLEDevice::take();
    let server = device.get_server();
    let service = OtaService::new(server, EspOtaWriter::new(), &config);

    if let Err(e) = OtaService::<EspOtaWriter>::start_advertising() {
        log::error!("Failed to start advertising: {:?}", e);
        return;
    }
    log::info!(
        "Advertising OTA service, max payload {} bytes",
        config.max_payload()
    );

    let mut last_status = String::new();
    loop {
        std::thread::sleep(Duration::from_secs(2));

        let status = service.status_string();
        if status != last_status {
            log::info!("OTA status: {}", status);
            last_status = status;
        }

        if service.is_complete() {
            let stats = service.stats().snapshot();
            log::info!(
                "Image received ({} chunks, {} duplicates), rebooting",
                stats.accepted,
                stats.duplicates
            );
            std::thread::sleep(Duration::from_secs(1));
            esp_idf_hal::reset::restart();
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin ota-host' to replay a transfer on the host.");
}

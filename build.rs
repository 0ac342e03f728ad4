fn main() {
    // ESP-IDF environment is only needed for device builds with the NVS store.
    let device = std::env::var("TARGET").is_ok_and(|t| t.contains("xtensa") || t.contains("espidf"));
    if device && std::env::var_os("CARGO_FEATURE_ESP32").is_some() {
        embuild::espidf::sysenv::output();
    }
}

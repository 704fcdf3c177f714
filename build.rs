fn main() {
    // ── macOS: embed Info.plist so CoreBluetooth grants Bluetooth access ──────
    //
    // CBCentralManager stays "unauthorised" and never reports advertisements
    // unless the running binary carries an Info.plist with
    // NSBluetoothAlwaysUsageDescription.  CLI tools have no bundle, so the
    // plist goes into the __TEXT,__info_plist section of the Mach-O binary via
    // the linker `-sectcreate` flag.
    //
    // `CARGO_CFG_TARGET_OS` is the target, not the host, so cross-compiling
    // from Linux to macOS picks this up as well.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        let dir = std::env::var("CARGO_MANIFEST_DIR")
            .expect("CARGO_MANIFEST_DIR must be set by Cargo");
        let plist = format!("{dir}/Info.plist");

        for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
            println!("cargo:rustc-link-arg={arg}");
        }
        println!("cargo:rerun-if-changed=Info.plist");
    }
}

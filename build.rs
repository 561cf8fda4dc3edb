// Build script for the Android cdylib
//
// Oboe is a C++ library; its objects need the shared C++ runtime at link time.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Link against libc++_shared so symbols like __cxa_pure_virtual resolve
    // correctly on all ABIs (arm/x86).
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}

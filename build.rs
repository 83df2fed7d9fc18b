use std::env;

fn main() {
    let target = env::var("TARGET").unwrap();

    println!("cargo:rustc-check-cfg=cfg(cortex_m)");

    // the DWT cycle counter driver only exists on Cortex-M targets
    if target.starts_with("thumbv") {
        println!("cargo:rustc-cfg=cortex_m");
    }
}

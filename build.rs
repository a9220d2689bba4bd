fn main() {
    // ESP-IDF link arguments are only meaningful when cross-compiling;
    // host builds (tests, simulator) skip them.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}

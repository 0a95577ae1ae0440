//! Regenerates the live-data wire messages when the `codegen` feature is
//! enabled.
//!
//! By default, the checked-in `src/gen/livedata.rs` is used directly -- no
//! protoc or build-time codegen needed. To regenerate after editing
//! `proto/livedata.proto`:
//!
//! ```bash
//! cargo build --features codegen
//! cp target/*/build/binance-live-*/out/livedata.rs src/gen/
//! ```

fn main() {
    #[cfg(feature = "codegen")]
    prost_build::compile_protos(&["proto/livedata.proto"], &["proto"])
        .expect("failed to compile protos");
}

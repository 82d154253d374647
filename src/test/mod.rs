//! Shared fixtures for unit tests.
//!
//! The fixture image carries the record classes of the engine (`Command`, `Call`) plus a few
//! misbehaving methods for exercising the invoke path. It has no emulator class; the complete
//! stub engine lives with the integration tests.

use std::sync::Arc;

use crate::{
    config::BridgeConfig,
    runtime::{
        exception_type, AssemblyImage, Environment, ForeignException, ForeignValue, ObjectRef,
        RuntimeHost,
    },
};

pub const NAMESPACE: &str = "mtemu";
pub const COMMAND_CLASS: &str = "Command";
pub const CALL_CLASS: &str = "Call";

pub fn fixture_config() -> BridgeConfig {
    BridgeConfig::default().with_domain_name("fixture")
}

pub fn fixture_image() -> AssemblyImage {
    AssemblyImage::builder("engine.dll")
        .class(NAMESPACE, COMMAND_CLASS, |class| {
            class
                .field("isOffset", "bool")
                .field("number_", "int")
                .field("words_", "int[]")
                .method("GetName()", "string", |ctx| {
                    let number = ctx.field_i32(ctx.this(), "number_")?;
                    Ok(ctx.alloc_string(&format!("command {number}"))?.into())
                })
                .method("GetJumpName()", "string", |ctx| {
                    let name = if ctx.field_bool(ctx.this(), "isOffset")? {
                        "offset"
                    } else {
                        "next"
                    };
                    Ok(ctx.alloc_string(name)?.into())
                })
                .method("Throw()", "int", |_ctx| {
                    Err(ForeignException::new(
                        exception_type::INVALID_OPERATION,
                        "requested",
                    ))
                })
                .method("Panic()", "int", |_ctx| panic!("boom"))
                .method("Liar()", "int", |_ctx| Ok(ForeignValue::Bool(true)))
                .method("Echo(Command)", "Command", |ctx| Ok(ctx.arg(0)?.clone()))
                .method("Stale()", "Command", |_ctx| {
                    Ok(ForeignValue::Object(ObjectRef::new(u64::MAX)))
                })
        })
        .class(NAMESPACE, CALL_CLASS, |class| {
            class
                .field("code_", "int")
                .field("arg0_", "int")
                .field("arg1_", "int")
        })
        .build()
        .expect("fixture image is well formed")
}

/// A fresh host with the fixture image installed and its environment initialized.
pub fn fixture_environment() -> (Arc<RuntimeHost>, Environment) {
    let host = RuntimeHost::new();
    host.install(fixture_image());
    let env = Environment::initialize(&host, &fixture_config()).expect("fixture environment");
    (host, env)
}

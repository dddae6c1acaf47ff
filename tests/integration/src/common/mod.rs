//! Shared fixtures for the integration tests
//!
//! Provides logging setup, the TestOrb loopback object (a derived interface
//! over a base interface), directory service startup helpers and simple
//! call statistics.

#![allow(dead_code)]

use binstream::{
    BinDecode, BinEncode, BinInStream, BinOutStream, Buf, BufMut, Bytes, StreamContext, StreamObject,
};
use nameserv::{NameServer, NameServerConfig};
use orb::{
    ClientProxy, Endpoint, InstanceId, Interface, InterfaceBuilder, InterfaceId, ObjectId,
    OrbConfig, OrbError, OrbRuntime, RemoteError,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Install a test-friendly subscriber; RUST_LOG controls the level
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// A runtime serving on an ephemeral loopback port
pub async fn start_runtime() -> Arc<OrbRuntime> {
    let runtime = OrbRuntime::init(OrbConfig::default());
    runtime.start_server(loopback()).await.unwrap();
    runtime
}

// ---------------------------------------------------------------------------
// TestOrb
// ---------------------------------------------------------------------------

pub const TEST_FACILITY: &str = "testorb";

pub mod test_code {
    pub const NOT_WHEN_RUNNING: u32 = 1;
    pub const BAD_SEQ_REPLY: u32 = 2;
}

pub const TEST_BASE_INTERFACE_ID: InterfaceId = InterfaceId::from_bytes([0x7b; 16]);
pub const TEST_ORB_INTERFACE_ID: InterfaceId = InterfaceId::from_bytes([0x7d; 16]);

orb::orb_methods! {
    /// Methods of the base interface
    pub enum TestBaseMethod {
        Describe => "Describe",
        ExceptTest => "ExceptTest",
        ExceptTestWithArg => "ExceptTestWithArg",
    }
}

orb::orb_methods! {
    /// Methods of the derived loopback interface
    pub enum TestOrbMethod {
        BumpIt => "BumpIt",
        ParamTest => "ParamTest",
        PollData => "PollData",
        SetData => "SetData",
        BulkTest => "BulkTest",
        VectorParamTest => "VectorParamTest",
        SlowCall => "SlowCall",
    }
}

orb::orb_methods! {
    /// A method no interface in the chain implements
    pub enum MissingMethod {
        Frobnicate => "Frobnicate",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Area {
    pub x: i32,
    pub y: i32,
    pub cx: u32,
    pub cy: u32,
}

impl Area {
    pub fn new(x: i32, y: i32, cx: u32, cy: u32) -> Self {
        Self { x, y, cx, cy }
    }
}

impl StreamObject for Area {
    const TYPE_NAME: &'static str = "Area";

    fn encode_fields<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        self.x.bin_encode(buf, ctx)?;
        self.y.bin_encode(buf, ctx)?;
        self.cx.bin_encode(buf, ctx)?;
        self.cy.bin_encode(buf, ctx)
    }

    fn decode_fields<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        Ok(Self {
            x: i32::bin_decode(buf, ctx)?,
            y: i32::bin_decode(buf, ctx)?,
            cx: u32::bin_decode(buf, ctx)?,
            cy: u32::bin_decode(buf, ctx)?,
        })
    }

    fn fields_size(&self) -> usize {
        16
    }
}

binstream::impl_bin_object!(Area);

/// Outputs of a successful parameter test
#[derive(Debug, Clone, PartialEq)]
pub struct ParamOutputs {
    pub card: u32,
    pub float: f64,
    pub text_out: String,
    pub text_inout: String,
    pub flag: bool,
}

/// Server side of the loopback object
pub struct TestOrbImpl {
    poll: Mutex<(u32, Area)>,
    calls: AtomicU64,
}

impl TestOrbImpl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            poll: Mutex::new((1, Area::new(1, 2, 3, 4))),
            calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn set_data(&self, area: Area) {
        let mut poll = self.poll.lock();
        poll.0 += 1;
        poll.1 = area;
    }

    /// New data only if the caller's serial number is stale
    fn poll_data(&self, serial: u32) -> (u32, Option<Area>) {
        let poll = self.poll.lock();
        if serial == poll.0 {
            (serial, None)
        } else {
            (poll.0, Some(poll.1))
        }
    }
}

fn param_test(
    card: u32,
    float: f64,
    text_in: &str,
    text_inout: &str,
    flag: bool,
) -> Result<ParamOutputs, String> {
    if card != 10 {
        return Err("incoming card param was bad".into());
    }
    if float != 3.11 {
        return Err("incoming float param was bad".into());
    }
    if text_in != "Test string in" {
        return Err("incoming text param was bad".into());
    }
    if text_inout != "Test string in" {
        return Err("incoming in/out text param was bad".into());
    }
    if flag {
        return Err("incoming flag param was bad".into());
    }
    Ok(ParamOutputs {
        card: 11,
        float: 3.12,
        text_out: "Test string out".into(),
        text_inout: "Test string out".into(),
        flag: true,
    })
}

macro_rules! handler {
    ($server:expr, $func:ident) => {{
        let server = Arc::clone(&$server);
        move |args| $func(Arc::clone(&server), args)
    }};
}

type OpResult = orb::Result<BinOutStream>;

async fn op_describe(server: Arc<TestOrbImpl>, _args: BinInStream) -> OpResult {
    server.count();
    Ok(BinOutStream::new().with("TestOrb loopback")?)
}

async fn op_except_test(server: Arc<TestOrbImpl>, _args: BinInStream) -> OpResult {
    server.count();
    Err(RemoteError::new(TEST_FACILITY, test_code::NOT_WHEN_RUNNING, "not allowed while running").into())
}

async fn op_except_test_with_arg(server: Arc<TestOrbImpl>, mut args: BinInStream) -> OpResult {
    server.count();
    let dummy: u32 = args.read()?;
    Err(RemoteError::new(
        TEST_FACILITY,
        test_code::BAD_SEQ_REPLY,
        format!("bad sequence reply ({})", dummy),
    )
    .into())
}

async fn op_bump_it(server: Arc<TestOrbImpl>, mut args: BinInStream) -> OpResult {
    server.count();
    let value: u32 = args.read()?;
    Ok(BinOutStream::new().with(&value.wrapping_add(1))?)
}

async fn op_param_test(server: Arc<TestOrbImpl>, mut args: BinInStream) -> OpResult {
    server.count();
    let card: u32 = args.read()?;
    let float: f64 = args.read()?;
    let text_in: String = args.read()?;
    let text_inout: String = args.read()?;
    let flag: bool = args.read()?;

    match param_test(card, float, &text_in, &text_inout, flag) {
        Ok(out) => Ok(BinOutStream::new()
            .with(&true)?
            .with(&out.card)?
            .with(&out.float)?
            .with(&out.text_out)?
            .with(&out.text_inout)?
            .with(&out.flag)?),
        Err(reason) => Ok(BinOutStream::new().with(&false)?.with(&reason)?),
    }
}

async fn op_poll_data(server: Arc<TestOrbImpl>, mut args: BinInStream) -> OpResult {
    server.count();
    let serial: u32 = args.read()?;
    let (serial, area) = server.poll_data(serial);
    Ok(BinOutStream::new().with(&serial)?.with(&area)?)
}

async fn op_set_data(server: Arc<TestOrbImpl>, mut args: BinInStream) -> OpResult {
    server.count();
    server.set_data(args.read()?);
    Ok(BinOutStream::new())
}

async fn op_bulk_test(server: Arc<TestOrbImpl>, mut args: BinInStream) -> OpResult {
    server.count();
    let data: Bytes = args.read()?;
    let flipped: Bytes = data.iter().map(|b| b ^ 0xFF).collect::<Vec<u8>>().into();
    Ok(BinOutStream::new().with(&flipped)?)
}

async fn op_vector_param_test(server: Arc<TestOrbImpl>, mut args: BinInStream) -> OpResult {
    server.count();
    let values: Vec<String> = args.read()?;
    let expected: Vec<String> = (1..=4).map(|i| format!("This is a {}", i)).collect();
    if values != expected {
        return Ok(BinOutStream::new().with(&None::<Vec<String>>)?);
    }
    let updated: Vec<String> = (1..=4).map(|i| format!("This is a test {}", i)).collect();
    Ok(BinOutStream::new().with(&Some(updated))?)
}

async fn op_slow_call(server: Arc<TestOrbImpl>, mut args: BinInStream) -> OpResult {
    server.count();
    let millis: u32 = args.read()?;
    tokio::time::sleep(Duration::from_millis(millis as u64)).await;
    Ok(BinOutStream::new().with(&millis)?)
}

pub fn create_test_base_interface(server: Arc<TestOrbImpl>) -> Interface {
    use TestBaseMethod as M;

    InterfaceBuilder::new(TEST_BASE_INTERFACE_ID, "TestBase")
        .operation(M::Describe, handler!(server, op_describe))
        .operation(M::ExceptTest, handler!(server, op_except_test))
        .operation(M::ExceptTestWithArg, handler!(server, op_except_test_with_arg))
        .build()
}

pub fn create_test_orb_interface(server: Arc<TestOrbImpl>) -> Interface {
    use TestOrbMethod as M;

    InterfaceBuilder::new(TEST_ORB_INTERFACE_ID, "TestOrb")
        .operation(M::BumpIt, handler!(server, op_bump_it))
        .operation(M::ParamTest, handler!(server, op_param_test))
        .operation(M::PollData, handler!(server, op_poll_data))
        .operation(M::SetData, handler!(server, op_set_data))
        .operation(M::BulkTest, handler!(server, op_bulk_test))
        .operation(M::VectorParamTest, handler!(server, op_vector_param_test))
        .operation(M::SlowCall, handler!(server, op_slow_call))
        .build()
}

/// A running loopback object
pub struct TestOrbFixture {
    pub runtime: Arc<OrbRuntime>,
    pub server: Arc<TestOrbImpl>,
    pub object_id: ObjectId,
}

impl TestOrbFixture {
    pub async fn start() -> Self {
        let runtime = start_runtime().await;
        let server = TestOrbImpl::new();
        let object_id = runtime
            .register_object(
                InstanceId::generate(),
                vec![
                    create_test_orb_interface(Arc::clone(&server)),
                    create_test_base_interface(Arc::clone(&server)),
                ],
                "TestOrbClient",
            )
            .await
            .unwrap();
        Self {
            runtime,
            server,
            object_id,
        }
    }

    pub async fn client(&self) -> TestOrbClient {
        TestOrbClient::connect(&self.runtime, &self.object_id)
            .await
            .unwrap()
    }
}

/// Typed proxy for the loopback object
pub struct TestOrbClient {
    proxy: ClientProxy,
}

impl TestOrbClient {
    pub async fn connect(runtime: &OrbRuntime, id: &ObjectId) -> orb::Result<Self> {
        let client = runtime.connect(id).await?;
        Ok(Self {
            proxy: ClientProxy::new(id.clone(), &TEST_ORB_INTERFACE_ID, client)?,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.proxy.set_timeout(timeout);
        self
    }

    pub fn proxy(&self) -> &ClientProxy {
        &self.proxy
    }

    pub async fn describe(&self) -> orb::Result<String> {
        Ok(self.proxy.call_no_args(TestBaseMethod::Describe).await?.read()?)
    }

    pub async fn except_test(&self) -> orb::Result<()> {
        self.proxy.call_no_args(TestBaseMethod::ExceptTest).await?;
        Ok(())
    }

    pub async fn except_test_with_arg(&self, dummy: u32) -> orb::Result<()> {
        let args = BinOutStream::new().with(&dummy)?;
        self.proxy.call(TestBaseMethod::ExceptTestWithArg, args).await?;
        Ok(())
    }

    pub async fn bump_it(&self, value: u32) -> orb::Result<u32> {
        let args = BinOutStream::new().with(&value)?;
        Ok(self.proxy.call(TestOrbMethod::BumpIt, args).await?.read()?)
    }

    /// `Err` carries the server's reason for rejecting the inputs
    pub async fn param_test(
        &self,
        card: u32,
        float: f64,
        text_in: &str,
        text_inout: &str,
        flag: bool,
    ) -> orb::Result<Result<ParamOutputs, String>> {
        let args = BinOutStream::new()
            .with(&card)?
            .with(&float)?
            .with(text_in)?
            .with(text_inout)?
            .with(&flag)?;
        let mut out = self.proxy.call(TestOrbMethod::ParamTest, args).await?;
        let ok: bool = out.read()?;
        if !ok {
            return Ok(Err(out.read()?));
        }
        Ok(Ok(ParamOutputs {
            card: out.read()?,
            float: out.read()?,
            text_out: out.read()?,
            text_inout: out.read()?,
            flag: out.read()?,
        }))
    }

    /// Returns the server's serial number and, if it differs from `serial`,
    /// the current data
    pub async fn poll_data(&self, serial: u32) -> orb::Result<(u32, Option<Area>)> {
        let args = BinOutStream::new().with(&serial)?;
        let mut out = self.proxy.call(TestOrbMethod::PollData, args).await?;
        Ok((out.read()?, out.read()?))
    }

    pub async fn set_data(&self, area: &Area) -> orb::Result<()> {
        let args = BinOutStream::new().with(area)?;
        self.proxy.call(TestOrbMethod::SetData, args).await?;
        Ok(())
    }

    pub async fn bulk_test(&self, data: &[u8]) -> orb::Result<Bytes> {
        let args = BinOutStream::new().with(&Bytes::copy_from_slice(data))?;
        Ok(self.proxy.call(TestOrbMethod::BulkTest, args).await?.read()?)
    }

    pub async fn vector_param_test(&self, values: &[String]) -> orb::Result<Option<Vec<String>>> {
        let args = BinOutStream::new().with(values)?;
        Ok(self.proxy.call(TestOrbMethod::VectorParamTest, args).await?.read()?)
    }

    pub async fn slow_call(&self, millis: u32) -> orb::Result<u32> {
        let args = BinOutStream::new().with(&millis)?;
        Ok(self.proxy.call(TestOrbMethod::SlowCall, args).await?.read()?)
    }

    pub async fn missing_method(&self) -> orb::Result<()> {
        self.proxy.call_no_args(MissingMethod::Frobnicate).await?;
        Ok(())
    }
}

/// True if `err` is a remote failure from `facility` with `code`
pub fn is_remote(err: &OrbError, facility: &str, code: u32) -> bool {
    err.remote().map_or(false, |r| r.is(facility, code))
}

// ---------------------------------------------------------------------------
// Directory service
// ---------------------------------------------------------------------------

/// A directory service running in its own runtime
pub struct NameServerFixture {
    pub runtime: Arc<OrbRuntime>,
    pub server: Arc<NameServer>,
    pub endpoint: Endpoint,
}

impl NameServerFixture {
    /// Start on `addr`; port 0 picks a free one
    pub async fn start_on(addr: SocketAddr, config: NameServerConfig) -> Self {
        let runtime = OrbRuntime::init(OrbConfig::default());
        let endpoint = runtime.start_server(addr).await.unwrap();
        let server = NameServer::new(config);
        server.publish(&runtime).await.unwrap();
        server.start_landlord();
        Self {
            runtime,
            server,
            endpoint,
        }
    }

    pub async fn start(config: NameServerConfig) -> Self {
        Self::start_on(loopback(), config).await
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.endpoint.port))
    }

    pub async fn stop(self) {
        self.server.stop_landlord();
        self.runtime.shutdown().await.unwrap();
    }
}

/// Poll `check` every 50ms until it holds or `limit` passes
pub async fn wait_for<F: FnMut() -> bool>(limit: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Call outcome counters shared by concurrent tasks
#[derive(Default)]
pub struct ConcurrentStats {
    success: AtomicU64,
    failure: AtomicU64,
    total_latency_us: AtomicU64,
}

impl ConcurrentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    pub fn avg_latency(&self) -> Duration {
        let count = self.success_count();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_latency_us.load(Ordering::Relaxed) / count)
    }
}

// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use courier::{
    get_service, Arguments, CallHandle, Client, ClientConfig, Components, Converted, Converter,
    Error, HttpRequest, InvocationRouter, LazyCallAdapter, Method, MethodDescriptor,
    ResponseEnvelope, SerdeConverter, SerializerRegistry, Service, ServiceDescriptor,
    ServiceState, Structured, Transport, TypeClassifier,
};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

impl Structured for User {}

#[derive(Clone, Debug, Serialize)]
struct NewUser {
    name: String,
}

struct Users {
    router: InvocationRouter,
}

impl Service for Users {
    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new("Users")
            .method(
                MethodDescriptor::get("get_user", "/users/{id}")
                    .path_param("id")
                    .returns::<User>(),
            )
            .method(
                MethodDescriptor::get("list_users", "/users")
                    .query_param("page")
                    .returns::<Vec<User>>(),
            )
            .method(
                MethodDescriptor::post("create_user", "/users")
                    .body_param()
                    .returns::<User>(),
            )
            .method(
                MethodDescriptor::get("user_names", "/users/names")
                    .returns::<BTreeMap<u64, String>>(),
            )
            .method(MethodDescriptor::get("raw_user", "/users/{id}").path_param("id"))
    }

    fn from_router(router: InvocationRouter) -> Self {
        Users { router }
    }
}

impl Users {
    fn get_user(&self, id: u64) -> CallHandle<User> {
        self.router.call("get_user", Arguments::new().value(id))
    }

    fn list_users(&self, page: Option<u32>) -> CallHandle<Vec<User>> {
        self.router.call("list_users", Arguments::new().optional(page))
    }

    fn create_user(&self, user: &NewUser) -> CallHandle<User> {
        match Arguments::new().body(user) {
            Ok(args) => self.router.call("create_user", args),
            Err(err) => CallHandle::failed(err),
        }
    }

    fn user_names(&self) -> CallHandle<BTreeMap<u64, String>> {
        self.router.call("user_names", Arguments::new())
    }

    fn raw_user(&self, id: u64) -> CallHandle<ResponseEnvelope> {
        self.router.call("raw_user", Arguments::new().value(id))
    }

    fn delete_user(&self, id: u64) -> CallHandle<ResponseEnvelope> {
        self.router.call("delete_user", Arguments::new().value(id))
    }
}

struct Broken;

impl Service for Broken {
    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new("Broken").method(MethodDescriptor::get("get", "/things/{id}"))
    }

    fn from_router(_router: InvocationRouter) -> Self {
        Broken
    }
}

#[derive(Default)]
struct MockTransport {
    responses: Mutex<VecDeque<Result<ResponseEnvelope, Error>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    fn respond(&self, response: Result<ResponseEnvelope, Error>) {
        self.responses.lock().push_back(response);
    }

    fn respond_json(&self, status: u16, body: &'static str) {
        self.respond(Ok(
            ResponseEnvelope::new(status, body).with_header("Content-Type", "application/json")
        ));
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<ResponseEnvelope, Error>> {
        self.requests.lock().push(request);
        let response = self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(Error::Network {
                message: "no response scripted".into(),
            })
        });
        future::ready(response).boxed()
    }
}

#[derive(Default)]
struct CountingConverter {
    calls: AtomicUsize,
}

impl Converter for CountingConverter {
    fn convert(
        &self,
        envelope: ResponseEnvelope,
        classifier: &TypeClassifier,
        registry: &SerializerRegistry,
    ) -> Result<Converted, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SerdeConverter.convert(envelope, classifier, registry)
    }
}

struct Fixture {
    client: Client,
    transport: Arc<MockTransport>,
    converter: Arc<CountingConverter>,
}

fn fixture(base_url: &str) -> Fixture {
    let transport = Arc::new(MockTransport::default());
    let converter = Arc::new(CountingConverter::default());
    let components = Components {
        transport: transport.clone(),
        converter: converter.clone(),
        ..Components::default()
    };
    let config = ClientConfig {
        logging: true,
        ..ClientConfig::new(base_url)
    };
    Fixture {
        client: Client::with_components(config, components).unwrap(),
        transport,
        converter,
    }
}

#[async_std::test]
async fn get_user_end_to_end() {
    let fx = fixture("https://api.example.com");
    fx.transport.respond_json(200, r#"{"id":42,"name":"Ada"}"#);

    let users = get_service::<Users>(&fx.client).unwrap();
    let user = users.get_user(42).await.unwrap();
    assert_eq!(
        user,
        User {
            id: 42,
            name: "Ada".into()
        }
    );

    let requests = fx.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[0].url.as_str(), "https://api.example.com/users/42");
    assert_eq!(requests[0].url.query(), None);
    assert!(requests[0].body.is_none());
}

#[async_std::test]
async fn not_found_skips_the_converter() {
    let fx = fixture("https://api.example.com");
    fx.transport.respond_json(404, r#"{"error":"no such user"}"#);

    let users = get_service::<Users>(&fx.client).unwrap();
    match users.get_user(42).await {
        Err(err @ Error::HttpStatus { .. }) => {
            assert_eq!(err.status(), Some(404));
            assert_eq!(
                &err.envelope().unwrap().body()[..],
                br#"{"error":"no such user"}"#
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(fx.converter.calls.load(Ordering::SeqCst), 0);
}

#[async_std::test]
async fn network_failures_surface_through_the_handle() {
    let fx = fixture("https://api.example.com");
    fx.transport.respond(Err(Error::Network {
        message: "connection refused".into(),
    }));
    let users = get_service::<Users>(&fx.client).unwrap();
    assert!(matches!(
        users.get_user(1).await,
        Err(Error::Network { .. })
    ));
}

#[test]
fn one_instance_per_service_type() {
    let fx = fixture("https://api.example.com");
    assert_eq!(fx.client.instances().state::<Users>(), ServiceState::Unbuilt);

    let first = get_service::<Users>(&fx.client).unwrap();
    let second = fx.client.service::<Users>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fx.client.instances().state::<Users>(), ServiceState::Ready);
    assert_eq!(fx.client.instances().len(), 1);

    // Another client builds its own instance.
    let other = fixture("https://api.example.com");
    let third = get_service::<Users>(&other.client).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
}

static COUNTER_BUILDS: AtomicUsize = AtomicUsize::new(0);

struct Counter;

impl Service for Counter {
    fn descriptor() -> ServiceDescriptor {
        COUNTER_BUILDS.fetch_add(1, Ordering::SeqCst);
        // Keep the build slow enough for the other threads to pile up behind it.
        std::thread::sleep(Duration::from_millis(20));
        ServiceDescriptor::new("Counter").method(MethodDescriptor::get("count", "/count"))
    }

    fn from_router(_router: InvocationRouter) -> Self {
        Counter
    }
}

#[test]
fn concurrent_first_requests_build_once() {
    let fx = Arc::new(fixture("https://api.example.com"));
    let handles = (0..8)
        .map(|_| {
            let fx = fx.clone();
            std::thread::spawn(move || get_service::<Counter>(&fx.client).unwrap())
        })
        .collect::<Vec<_>>();
    let instances = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    assert_eq!(COUNTER_BUILDS.load(Ordering::SeqCst), 1);
    assert_eq!(fx.client.instances().state::<Counter>(), ServiceState::Ready);
}

#[test]
fn ready_services_stay_ready_under_concurrent_lookups() {
    let fx = Arc::new(fixture("https://api.example.com"));
    get_service::<Users>(&fx.client).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let lookups = (0..4)
        .map(|_| {
            let fx = fx.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    get_service::<Users>(&fx.client).unwrap();
                }
            })
        })
        .collect::<Vec<_>>();

    let mut not_ready = 0;
    let mut miscounted = 0;
    for _ in 0..20_000 {
        if fx.client.instances().state::<Users>() != ServiceState::Ready {
            not_ready += 1;
        }
        if fx.client.instances().len() != 1 {
            miscounted += 1;
        }
    }
    stop.store(true, Ordering::SeqCst);
    for lookup in lookups {
        lookup.join().unwrap();
    }
    assert_eq!(not_ready, 0);
    assert_eq!(miscounted, 0);
}

#[test]
fn invalid_base_url_makes_no_calls() {
    let transport = Arc::new(MockTransport::default());
    let components = Components {
        transport: transport.clone(),
        ..Components::default()
    };
    match Client::with_components(ClientConfig::new("not a url"), components) {
        Err(Error::InvalidConfiguration { .. }) => {}
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    assert!(transport.requests().is_empty());
}

#[test]
fn invalid_descriptor_fails_service_construction() {
    let fx = fixture("https://api.example.com");
    assert!(matches!(
        get_service::<Broken>(&fx.client),
        Err(Error::InvalidConfiguration { .. })
    ));
    assert_eq!(fx.client.instances().state::<Broken>(), ServiceState::Unbuilt);
    assert!(fx.transport.requests().is_empty());
}

#[async_std::test]
async fn sequence_query_and_base_path() {
    let fx = fixture("https://api.example.com/v2/");
    fx.transport
        .respond_json(200, r#"[{"id":3,"name":"Cy"},{"id":1,"name":"Ada"}]"#);
    fx.transport.respond_json(200, "[]");

    let users = get_service::<Users>(&fx.client).unwrap();
    let page = users.list_users(Some(2)).await.unwrap();
    assert_eq!(page.iter().map(|u| u.id).collect::<Vec<_>>(), vec![3, 1]);
    assert!(users.list_users(None).await.unwrap().is_empty());

    let urls = fx
        .transport
        .requests()
        .into_iter()
        .map(|req| req.url.to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        urls,
        vec![
            "https://api.example.com/v2/users?page=2",
            "https://api.example.com/v2/users",
        ]
    );
}

#[async_std::test]
async fn post_body_and_mapping() {
    let fx = fixture("https://api.example.com");
    fx.transport.respond_json(201, r#"{"id":7,"name":"Grace"}"#);
    fx.transport.respond_json(200, r#"{"7":"Grace","42":"Ada"}"#);

    let users = get_service::<Users>(&fx.client).unwrap();
    let created = users
        .create_user(&NewUser {
            name: "Grace".into(),
        })
        .await
        .unwrap();
    assert_eq!(created.id, 7);

    let names = users.user_names().await.unwrap();
    assert_eq!(names[&7], "Grace");
    assert_eq!(names[&42], "Ada");

    let requests = fx.transport.requests();
    assert_eq!(requests[0].method, Method::Post);
    let body = requests[0].body.as_ref().unwrap();
    assert_eq!(body.content_type, "application/json");
    assert_eq!(&body.bytes[..], br#"{"name":"Grace"}"#);
}

#[async_std::test]
async fn raw_envelope_is_returned_unchanged() {
    let fx = fixture("https://api.example.com");
    let envelope = ResponseEnvelope::new(200, "<html>not json</html>")
        .with_header("Content-Type", "text/html")
        .with_header("X-Request-Id", "abc");
    fx.transport.respond(Ok(envelope.clone()));

    let users = get_service::<Users>(&fx.client).unwrap();
    assert_eq!(users.raw_user(42).await.unwrap(), envelope);
}

#[async_std::test]
async fn serializers_are_cached_across_calls() {
    let fx = fixture("https://api.example.com");
    for id in 0..3 {
        fx.transport.respond(Ok(ResponseEnvelope::new(
            200,
            format!(r#"{{"id":{},"name":"n"}}"#, id),
        )));
    }
    let users = get_service::<Users>(&fx.client).unwrap();
    for id in 0..3 {
        assert_eq!(users.get_user(id).await.unwrap().id, id);
    }
    assert_eq!(fx.client.registry().computations(), 1);
    assert_eq!(fx.client.registry().len(), 1);
}

#[async_std::test]
async fn unbound_method_fails_fast() {
    let fx = fixture("https://api.example.com");
    let users = get_service::<Users>(&fx.client).unwrap();
    match users.delete_user(1).await {
        Err(Error::UnboundMethod { service, method }) => {
            assert_eq!(service, "Users");
            assert_eq!(method, "delete_user");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(fx.transport.requests().is_empty());
}

#[derive(Default)]
struct Stalled {
    sent: AtomicUsize,
    dropped: Arc<AtomicUsize>,
}

struct DropGuard(Arc<AtomicUsize>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Transport for Stalled {
    fn send(&self, _request: HttpRequest) -> BoxFuture<'_, Result<ResponseEnvelope, Error>> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let guard = DropGuard(self.dropped.clone());
        async move {
            let _guard = guard;
            future::pending::<Result<ResponseEnvelope, Error>>().await
        }
        .boxed()
    }
}

#[async_std::test]
async fn cancellation_drops_the_transport_call() {
    let stalled = Arc::new(Stalled::default());
    let components = Components {
        transport: stalled.clone(),
        ..Components::default()
    };
    let client =
        Client::with_components(ClientConfig::new("https://api.example.com"), components).unwrap();
    let users = get_service::<Users>(&client).unwrap();

    // The call starts on its own; cancel it once it is waiting on the transport.
    let handle = users.get_user(1);
    while stalled.sent.load(Ordering::SeqCst) == 0 {
        async_std::task::yield_now().await;
    }
    handle.cancel();
    assert!(matches!(handle.await, Err(Error::Cancelled)));
    assert_eq!(stalled.dropped.load(Ordering::SeqCst), 1);
}

#[test]
fn lazy_adapter_runs_when_waited_on() {
    let transport = Arc::new(MockTransport::default());
    transport.respond_json(200, r#"{"id":5,"name":"Lin"}"#);
    let components = Components {
        transport: transport.clone(),
        call_adapter: Arc::new(LazyCallAdapter),
        ..Components::default()
    };
    let client =
        Client::with_components(ClientConfig::new("https://api.example.com"), components).unwrap();
    let users = get_service::<Users>(&client).unwrap();

    let handle = users.get_user(5);
    assert!(transport.requests().is_empty());
    assert_eq!(handle.wait().unwrap().name, "Lin");
    assert_eq!(transport.requests().len(), 1);
}

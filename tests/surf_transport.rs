// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use courier::{
    get_service, ApiError, Arguments, BearerAuthenticator, CallHandle, Client, ClientConfig,
    ClientError, Components, Error, InvocationRouter, MethodDescriptor, ResponseEnvelope, Service,
    ServiceDescriptor, Structured,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use tide::http::mime;
use tide::listener::Listener;
use tide::{Body, Request, Response};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Account {
    id: u64,
    owner: String,
}

impl Structured for Account {}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct NewAccount {
    owner: String,
}

#[derive(Debug, Snafu, Serialize, Deserialize, PartialEq)]
enum LedgerError {
    #[snafu(display("no such account {}", id))]
    NoSuchAccount { id: u64 },
    #[snafu(display("{}", msg))]
    Other { msg: String },
}

impl ApiError for LedgerError {
    fn catch_all(msg: String) -> Self {
        LedgerError::Other { msg }
    }
}

struct Ledger {
    router: InvocationRouter,
}

impl Service for Ledger {
    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new("Ledger")
            .method(
                MethodDescriptor::get("account", "/accounts/{id}")
                    .path_param("id")
                    .returns::<Account>(),
            )
            .method(
                MethodDescriptor::get("packed_account", "/packed/{id}")
                    .path_param("id")
                    .returns::<Account>(),
            )
            .method(
                MethodDescriptor::get("search", "/accounts")
                    .query_param("owner")
                    .returns::<Vec<Account>>(),
            )
            .method(
                MethodDescriptor::post("open", "/accounts")
                    .header_param("X-Branch")
                    .body_param()
                    .returns::<Account>(),
            )
            .method(MethodDescriptor::get("whoami", "/whoami").returns::<String>())
            .method(
                MethodDescriptor::get("raw_account", "/accounts/{id}")
                    .path_param("id")
                    .returns::<ResponseEnvelope>(),
            )
    }

    fn from_router(router: InvocationRouter) -> Self {
        Ledger { router }
    }
}

impl Ledger {
    fn account(&self, id: u64) -> CallHandle<Account> {
        self.router.call("account", Arguments::new().value(id))
    }

    fn packed_account(&self, id: u64) -> CallHandle<Account> {
        self.router.call("packed_account", Arguments::new().value(id))
    }

    fn search(&self, owner: &str) -> CallHandle<Vec<Account>> {
        self.router.call("search", Arguments::new().optional(Some(owner)))
    }

    fn open(&self, branch: Option<&str>, account: &NewAccount) -> CallHandle<Account> {
        match Arguments::new().optional(branch).body(account) {
            Ok(args) => self.router.call("open", args),
            Err(err) => CallHandle::failed(err),
        }
    }

    fn whoami(&self) -> CallHandle<String> {
        self.router.call("whoami", Arguments::new())
    }

    fn raw_account(&self, id: u64) -> CallHandle<ResponseEnvelope> {
        self.router.call("raw_account", Arguments::new().value(id))
    }
}

fn account(id: u64) -> Account {
    Account {
        id,
        owner: format!("owner{}", id),
    }
}

/// Start a server on a free local port and return its base URL.
async fn serve() -> String {
    let mut app = tide::new();
    app.at("/accounts/:id").get(|req: Request<()>| async move {
        let id: u64 = req.param("id")?.parse()?;
        if id == 0 {
            return Ok::<_, tide::Error>(
                Response::builder(404)
                    .body(r#"{"NoSuchAccount":{"id":0}}"#)
                    .content_type(mime::JSON)
                    .build(),
            );
        }
        Ok(Response::builder(200)
            .body(Body::from_json(&account(id))?)
            .header("X-Served-By", "ledger")
            .build())
    });
    app.at("/packed/:id").get(|req: Request<()>| async move {
        let id: u64 = req.param("id")?.parse()?;
        let bytes = bincode::serialize(&account(id))?;
        Ok::<_, tide::Error>(
            Response::builder(200)
                .body(Body::from_bytes(bytes))
                .build(),
        )
    });
    app.at("/accounts").get(|req: Request<()>| async move {
        let owner = req
            .url()
            .query_pairs()
            .find(|(name, _)| name == "owner")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        let accounts = vec![Account { id: 1, owner }];
        Ok::<_, tide::Error>(
            Response::builder(200)
                .body(Body::from_json(&accounts)?)
                .build(),
        )
    });
    app.at("/accounts").post(|mut req: Request<()>| async move {
        let branch = req
            .header("x-branch")
            .map(|values| values.last().as_str().to_string())
            .unwrap_or_else(|| "main".to_string());
        let new: NewAccount = req.body_json().await?;
        let opened = Account {
            id: 99,
            owner: format!("{}@{}", new.owner, branch),
        };
        Ok::<_, tide::Error>(
            Response::builder(201)
                .body(Body::from_json(&opened)?)
                .build(),
        )
    });
    app.at("/whoami").get(|req: Request<()>| async move {
        let token = req
            .header("authorization")
            .map(|values| values.last().as_str().to_string())
            .unwrap_or_default();
        Ok::<_, tide::Error>(
            Response::builder(200)
                .body(token)
                .content_type(mime::PLAIN)
                .build(),
        )
    });

    let mut listener = app.bind("127.0.0.1:0").await.unwrap();
    let url = listener.info()[0].connection().to_string();
    async_std::task::spawn(async move { listener.accept().await });
    url
}

fn ledger(base_url: &str, components: Components) -> Arc<Ledger> {
    let config = ClientConfig {
        logging: true,
        timeout_ms: Some(5000),
        ..ClientConfig::new(base_url)
    };
    let client = Client::with_components(config, components).unwrap();
    get_service::<Ledger>(&client).unwrap()
}

#[async_std::test]
async fn json_and_bincode_responses() {
    let url = serve().await;
    let ledger = ledger(&url, Components::default());

    assert_eq!(ledger.account(7).await.unwrap(), account(7));
    assert_eq!(ledger.packed_account(8).await.unwrap(), account(8));

    let raw = ledger.raw_account(7).await.unwrap();
    assert_eq!(raw.status(), 200);
    assert_eq!(raw.header("x-served-by"), Some("ledger"));
    assert!(raw.content_type().unwrap().starts_with("application/json"));
}

#[async_std::test]
async fn error_status_decodes_into_api_error() {
    let url = serve().await;
    let ledger = ledger(&url, Components::default());

    let res = ledger.account(0).await;
    assert_eq!(res.as_ref().map_err(Error::status).err(), Some(Some(404)));
    let res: Result<Account, LedgerError> = res.context(ClientError);
    assert_eq!(res, Err(LedgerError::NoSuchAccount { id: 0 }));
}

#[async_std::test]
async fn query_header_and_body_reach_the_server() {
    let url = serve().await;
    let ledger = ledger(&url, Components::default());

    let found = ledger.search("Ada Lovelace & co").await.unwrap();
    assert_eq!(found[0].owner, "Ada Lovelace & co");

    let opened = ledger
        .open(
            Some("east"),
            &NewAccount {
                owner: "grace".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(opened.owner, "grace@east");

    let opened = ledger
        .open(
            None,
            &NewAccount {
                owner: "grace".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(opened.owner, "grace@main");
}

#[async_std::test]
async fn authenticator_decorates_requests() {
    let url = serve().await;
    let components = Components {
        authenticator: Arc::new(BearerAuthenticator::new("s3cret")),
        ..Components::default()
    };
    let ledger = ledger(&url, components);
    assert_eq!(ledger.whoami().await.unwrap(), "Bearer s3cret");
}

#[async_std::test]
async fn unreachable_server_is_a_network_error() {
    // Bind a port, then release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let ledger = ledger(&format!("http://{}", addr), Components::default());
    assert!(matches!(
        ledger.account(1).await,
        Err(Error::Network { .. })
    ));
}

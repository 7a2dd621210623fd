//! Account authentication: Mojang (Yggdrasil) credential exchange, Microsoft
//! OAuth-to-Xbox-to-game-service chain, and the on-disk session database.

use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::fs::{self, File};

use indexmap::IndexMap;
use serde_json::{json, Value};
use uuid::Uuid;

use reqwest::{Client, StatusCode};
use jsonwebtoken::{DecodingKey, TokenData, Validation};


const AUTHSERVER_URL: &str = "https://authserver.mojang.com";
const MS_OAUTH_AUTHORIZE_URL: &str = "https://login.live.com/oauth20_authorize.srf";
const MS_OAUTH_TOKEN_URL: &str = "https://login.live.com/oauth20_token.srf";
const XBL_AUTH_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
const XSTS_AUTH_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
const MC_AUTH_URL: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
const MC_PROFILE_URL: &str = "https://api.minecraftservices.com/minecraft/profile";

/// An authentication error.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level request error.
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    /// A JWT decoding error.
    #[error("jwt: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    /// An underlying I/O error, from the session database.
    #[error("io: {0}")]
    Io(#[from] io::Error),
    /// An unexpected HTTP status has been received.
    #[error("invalid status: {0}")]
    InvalidStatus(u16),
    /// The authentication service rejected the request with the given message.
    #[error("failed: {0}")]
    Failed(String),
    /// The XSTS user hash differs from the XBL one.
    #[error("inconsistent user hash")]
    InconsistentUserHash,
    /// The account doesn't own the game.
    #[error("does not own the game")]
    DoesNotOwnGame,
    /// The access token is outdated, refreshing the session may recover.
    #[error("outdated token")]
    OutdatedToken,
}

/// A session from the Mojang credential exchange service.
#[derive(Debug, Clone, Default)]
pub struct YggdrasilSession {
    pub access_token: String,
    pub username: String,
    pub uuid: String,
    pub client_token: String,
}

impl YggdrasilSession {

    /// Exchange the given credentials for a new session, with a freshly generated
    /// client token.
    pub fn authenticate(email_or_username: &str, password: &str) -> Result<Self, Error> {
        crate::http::sync(async move {

            let client = crate::http::client()?;
            let client_token = Uuid::new_v4().simple().to_string();

            let res = client.post(format!("{AUTHSERVER_URL}/authenticate"))
                .json(&json!({
                    "agent": {
                        "name": "Minecraft",
                        "version": 1,
                    },
                    "username": email_or_username,
                    "password": password,
                    "clientToken": client_token,
                }))
                .send().await?;

            if res.status() != StatusCode::OK {
                return Err(yggdrasil_error(res).await);
            }

            let res = res.json::<serde::YggdrasilSuccess>().await?;

            Ok(Self {
                access_token: res.access_token,
                username: res.selected_profile.name,
                uuid: res.selected_profile.id,
                client_token: res.client_token,
            })

        })
    }

    /// Return true if the access token is still usable.
    pub fn validate(&self) -> Result<bool, Error> {
        crate::http::sync(async move {
            let client = crate::http::client()?;
            let res = client.post(format!("{AUTHSERVER_URL}/validate"))
                .json(&self.token_payload())
                .send().await?;
            Ok(res.status() == StatusCode::NO_CONTENT)
        })
    }

    /// Refresh the access token, also updating the username if it was changed.
    pub fn refresh(&mut self) -> Result<(), Error> {
        crate::http::sync(async {

            let client = crate::http::client()?;
            let res = client.post(format!("{AUTHSERVER_URL}/refresh"))
                .json(&self.token_payload())
                .send().await?;

            if res.status() != StatusCode::OK {
                return Err(yggdrasil_error(res).await);
            }

            let res = res.json::<serde::YggdrasilSuccess>().await?;
            self.access_token = res.access_token;
            self.username = res.selected_profile.name;
            Ok(())

        })
    }

    /// Invalidate the access token, best-effort.
    pub fn invalidate(&self) -> Result<(), Error> {
        crate::http::sync(async move {
            let client = crate::http::client()?;
            client.post(format!("{AUTHSERVER_URL}/invalidate"))
                .json(&self.token_payload())
                .send().await?;
            Ok(())
        })
    }

    fn token_payload(&self) -> Value {
        json!({
            "accessToken": self.access_token,
            "clientToken": self.client_token,
        })
    }

}

/// Extract the error message of a Yggdrasil error response.
async fn yggdrasil_error(res: reqwest::Response) -> Error {
    let document = res.json::<Value>().await.unwrap_or_default();
    Error::Failed(document.get("errorMessage")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string())
}

/// A session from the Microsoft OAuth to Xbox Live to game service chain.
#[derive(Debug, Clone, Default)]
pub struct MicrosoftSession {
    pub access_token: String,
    pub username: String,
    pub uuid: String,
    pub refresh_token: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// A server-side username change observed during validation, consumed by the
    /// next refresh. Transient, never persisted.
    pending_username: Option<String>,
}

impl MicrosoftSession {

    /// Run the full authentication chain from an OAuth authorization code.
    pub fn authenticate(client_id: &str, code: &str, redirect_uri: &str) -> Result<Self, Error> {

        let outcome = crate::http::sync(request_chain(&serde::TokenRequest::AuthorizationCode {
            client_id,
            redirect_uri,
            code,
            scope: "xboxlive.signin",
        }))?;

        Ok(Self {
            access_token: outcome.access_token,
            username: outcome.username,
            uuid: outcome.uuid,
            refresh_token: outcome.refresh_token,
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            pending_username: None,
        })

    }

    /// Return the authorize URL that the user should open to obtain an authorization
    /// code (posted back to the redirect URI alongside an id_token).
    pub fn authentication_url(client_id: &str, redirect_uri: &str, email: &str, nonce: &str) -> String {
        reqwest::Url::parse_with_params(MS_OAUTH_AUTHORIZE_URL, [
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code id_token"),
            ("scope", "xboxlive.signin offline_access openid email"),
            ("login_hint", email),
            ("nonce", nonce),
            ("response_mode", "form_post"),
        ]).unwrap().to_string()
    }

    /// Decode the given OpenID id_token, without validating its signature, and check
    /// that its nonce and email claims match the expected ones.
    pub fn check_token_id(id_token: &str, email: &str, nonce: &str) -> Result<bool, Error> {
        let data = decode_jwt_without_validation::<serde::OpenIdClaims>(id_token)?;
        Ok(data.claims.nonce.as_deref() == Some(nonce)
            && data.claims.email.as_deref() == Some(email))
    }

    /// Return true if the access token is usable and the stored username up-to-date.
    /// A server-side rename makes the session invalid but refreshable without running
    /// the full chain.
    pub fn validate(&mut self) -> Result<bool, Error> {

        self.pending_username = None;

        crate::http::sync(async {

            let client = crate::http::client()?;
            let res = client.get(MC_PROFILE_URL)
                .bearer_auth(&self.access_token)
                .send().await?;

            if res.status() != StatusCode::OK {
                return Ok(false);
            }

            let profile = res.json::<serde::McProfile>().await?;
            if profile.name != self.username {
                self.pending_username = Some(profile.name);
                return Ok(false);
            }

            Ok(true)

        })

    }

    /// Refresh this session. A pending rename observed by validation is consumed
    /// directly, otherwise the full token-refresh chain runs. The session is left
    /// untouched if the chain fails.
    pub fn refresh(&mut self) -> Result<(), Error> {

        if let Some(username) = self.pending_username.take() {
            self.username = username;
            return Ok(());
        }

        let outcome = crate::http::sync(request_chain(&serde::TokenRequest::RefreshToken {
            client_id: &self.client_id,
            redirect_uri: &self.redirect_uri,
            refresh_token: &self.refresh_token,
            scope: "xboxlive.signin",
        }))?;

        self.access_token = outcome.access_token;
        self.username = outcome.username;
        self.uuid = outcome.uuid;
        self.refresh_token = outcome.refresh_token;
        Ok(())

    }

}

/// Outcome of the full Microsoft authentication chain.
#[derive(Debug)]
struct ChainOutcome {
    access_token: String,
    refresh_token: String,
    username: String,
    uuid: String,
}

/// Run the 5-step chain: OAuth token endpoint, XBL, XSTS (with user hash coherency
/// check), game service authentication, profile.
async fn request_chain(grant: &serde::TokenRequest<'_>) -> Result<ChainOutcome, Error> {

    let client = crate::http::client()?;

    // 1. OAuth token endpoint, url-encoded form.
    let res = client.post(MS_OAUTH_TOKEN_URL)
        .form(grant)
        .send().await?;

    let token = match res.status() {
        StatusCode::OK => res.json::<serde::TokenSuccess>().await?,
        StatusCode::BAD_REQUEST => {
            let res = res.json::<serde::TokenError>().await?;
            return Err(Error::Failed(res.error_description));
        }
        status => return Err(Error::InvalidStatus(status.as_u16())),
    };

    // 2. Xbox Live user token from the RPS ticket.
    let user = request_xbl(&client, XBL_AUTH_URL, json!({
        "Properties": {
            "AuthMethod": "RPS",
            "SiteName": "user.auth.xboxlive.com",
            "RpsTicket": format!("d={}", token.access_token),
        },
        "RelyingParty": "http://auth.xboxlive.com",
        "TokenType": "JWT",
    })).await?;

    let user_hash = user.display_claims.xui.first()
        .map(|xui| xui.uhs.as_str())
        .ok_or_else(|| Error::Failed("missing display claims".to_string()))?;

    // 3. XSTS token authorized for the game service.
    let xsts = request_xbl(&client, XSTS_AUTH_URL, json!({
        "Properties": {
            "SandboxId": "RETAIL",
            "UserTokens": [user.token],
        },
        "RelyingParty": "rp://api.minecraftservices.com/",
        "TokenType": "JWT",
    })).await?;

    let xsts_hash = xsts.display_claims.xui.first()
        .map(|xui| xui.uhs.as_str())
        .ok_or_else(|| Error::Failed("missing display claims".to_string()))?;

    if user_hash != xsts_hash {
        return Err(Error::InconsistentUserHash);
    }

    // 4. Game service authentication.
    let res = client.post(MC_AUTH_URL)
        .json(&json!({
            "identityToken": format!("XBL3.0 x={user_hash};{}", xsts.token),
        }))
        .send().await?;

    let game = match res.status() {
        StatusCode::OK => res.json::<serde::McAuthSuccess>().await?,
        status => return Err(Error::InvalidStatus(status.as_u16())),
    };

    // 5. Profile, also discriminating accounts that don't own the game.
    let res = client.get(MC_PROFILE_URL)
        .bearer_auth(&game.access_token)
        .send().await?;

    let profile = match res.status() {
        StatusCode::OK => res.json::<serde::McProfile>().await?,
        StatusCode::NOT_FOUND => return Err(Error::DoesNotOwnGame),
        StatusCode::UNAUTHORIZED => return Err(Error::OutdatedToken),
        _ => {
            let document = res.json::<Value>().await.unwrap_or_default();
            let message = document.get("errorMessage")
                .or_else(|| document.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(Error::Failed(message.to_string()));
        }
    };

    Ok(ChainOutcome {
        access_token: game.access_token,
        refresh_token: token.refresh_token,
        username: profile.name,
        uuid: profile.id,
    })

}

async fn request_xbl(client: &Client, url: &str, payload: Value) -> Result<serde::XblSuccess, Error> {

    let res = client.post(url)
        .json(&payload)
        .send().await?;

    match res.status() {
        StatusCode::OK => Ok(res.json::<serde::XblSuccess>().await?),
        status => Err(Error::InvalidStatus(status.as_u16())),
    }

}

fn decode_jwt_without_validation<T>(token: &str) -> jsonwebtoken::errors::Result<TokenData<T>>
where
    T: ::serde::de::DeserializeOwned,
{
    // We don't want to validate the token, just decode its payload.
    let key = DecodingKey::from_secret(&[]);
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    jsonwebtoken::decode(token, &key, &validation)
}

/// The two supported session flavors, also the type tags of the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Yggdrasil,
    Microsoft,
}

impl SessionKind {

    pub fn tag(self) -> &'static str {
        match self {
            SessionKind::Yggdrasil => "yggdrasil",
            SessionKind::Microsoft => "microsoft",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "yggdrasil" => SessionKind::Yggdrasil,
            "microsoft" => SessionKind::Microsoft,
            _ => return None
        })
    }

}

/// A stored session of either flavor, the persisted type tag drives decoding into the
/// right variant. Each variant declares an explicit ordered field list, read and
/// written by [`Self::from_record`] and [`Self::to_record`].
#[derive(Debug, Clone)]
pub enum Session {
    Yggdrasil(YggdrasilSession),
    Microsoft(MicrosoftSession),
}

impl Session {

    pub fn kind(&self) -> SessionKind {
        match self {
            Session::Yggdrasil(_) => SessionKind::Yggdrasil,
            Session::Microsoft(_) => SessionKind::Microsoft,
        }
    }

    pub fn access_token(&self) -> &str {
        match self {
            Session::Yggdrasil(session) => &session.access_token,
            Session::Microsoft(session) => &session.access_token,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Session::Yggdrasil(session) => &session.username,
            Session::Microsoft(session) => &session.username,
        }
    }

    pub fn uuid(&self) -> &str {
        match self {
            Session::Yggdrasil(session) => &session.uuid,
            Session::Microsoft(session) => &session.uuid,
        }
    }

    pub fn validate(&mut self) -> Result<bool, Error> {
        match self {
            Session::Yggdrasil(session) => session.validate(),
            Session::Microsoft(session) => session.validate(),
        }
    }

    pub fn refresh(&mut self) -> Result<(), Error> {
        match self {
            Session::Yggdrasil(session) => session.refresh(),
            Session::Microsoft(session) => session.refresh(),
        }
    }

    pub fn invalidate(&self) -> Result<(), Error> {
        match self {
            Session::Yggdrasil(session) => session.invalidate(),
            Session::Microsoft(_) => Ok(()),
        }
    }

    /// Serialize this session to its persisted record, writing exactly the fields of
    /// its variant.
    pub(crate) fn to_record(&self) -> serde_json::Map<String, Value> {
        let fields: &[(&str, &str)] = match self {
            Session::Yggdrasil(session) => &[
                ("access_token", &session.access_token),
                ("username", &session.username),
                ("uuid", &session.uuid),
                ("client_token", &session.client_token),
            ],
            Session::Microsoft(session) => &[
                ("access_token", &session.access_token),
                ("username", &session.username),
                ("uuid", &session.uuid),
                ("refresh_token", &session.refresh_token),
                ("client_id", &session.client_id),
                ("redirect_uri", &session.redirect_uri),
            ],
        };
        fields.iter()
            .map(|&(field, value)| (field.to_string(), Value::String(value.to_string())))
            .collect()
    }

    /// Decode a session record of the given kind, missing fields default to empty.
    pub(crate) fn from_record(kind: SessionKind, record: &serde_json::Map<String, Value>) -> Self {

        let field = |name: &str| record.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind {
            SessionKind::Yggdrasil => Session::Yggdrasil(YggdrasilSession {
                access_token: field("access_token"),
                username: field("username"),
                uuid: field("uuid"),
                client_token: field("client_token"),
            }),
            SessionKind::Microsoft => Session::Microsoft(MicrosoftSession {
                access_token: field("access_token"),
                username: field("username"),
                uuid: field("uuid"),
                refresh_token: field("refresh_token"),
                client_id: field("client_id"),
                redirect_uri: field("redirect_uri"),
                pending_username: None,
            }),
        }

    }

}

/// The on-disk session database, keyed by session kind and account email or username.
///
/// The disk schema is `{"<tag>": {"sessions": {"<key>": {"<field>": "<value>"}}}}`,
/// unknown tags are dropped. A legacy single-line-per-record text file is imported,
/// then deleted, when the primary file doesn't exist yet.
#[derive(Debug, Default)]
pub struct Database {
    file: PathBuf,
    legacy_file: PathBuf,
    sessions: IndexMap<SessionKind, IndexMap<String, Session>>,
}

impl Database {

    pub fn new(file: impl Into<PathBuf>, legacy_file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            legacy_file: legacy_file.into(),
            sessions: IndexMap::new(),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Load the database from disk, replacing the in-memory sessions. A missing
    /// primary file triggers the legacy import, any decode or shape error leaves the
    /// in-memory map empty.
    pub fn load(&mut self) {
        self.sessions.clear();
        if self.file.is_file() {
            if let Some(sessions) = read_database_file(&self.file) {
                self.sessions = sessions;
            }
        } else {
            self.import_legacy();
        }
    }

    /// Import sessions from the legacy newline-delimited format, then delete it.
    fn import_legacy(&mut self) {

        let Ok(content) = fs::read_to_string(&self.legacy_file) else {
            return;
        };

        for line in content.lines() {
            let mut parts = line.trim().split(' ');
            if let (Some(key), Some(client_token), Some(username), Some(uuid), Some(access_token), None) =
                (parts.next(), parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
            {
                self.put(key, Session::Yggdrasil(YggdrasilSession {
                    access_token: access_token.to_string(),
                    username: username.to_string(),
                    uuid: uuid.to_string(),
                    client_token: client_token.to_string(),
                }));
            }
        }

        let _ = fs::remove_file(&self.legacy_file);

    }

    /// Save the database, atomically through a temporary sibling file.
    pub fn save(&self) -> Result<(), Error> {

        let mut document = serde_json::Map::new();
        for (kind, sessions) in &self.sessions {
            let mut records = serde_json::Map::new();
            for (key, session) in sessions {
                records.insert(key.clone(), Value::Object(session.to_record()));
            }
            document.insert(kind.tag().to_string(), json!({ "sessions": records }));
        }

        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_file = crate::path::with_suffix(&self.file, ".tmp");
        let writer = BufWriter::new(File::create(&tmp_file)?);
        serde_json::to_writer_pretty(writer, &Value::Object(document))
            .map_err(io::Error::other)?;
        fs::rename(&tmp_file, &self.file)?;

        Ok(())

    }

    pub fn get(&self, kind: SessionKind, key: &str) -> Option<&Session> {
        self.sessions.get(&kind)?.get(key)
    }

    pub fn get_mut(&mut self, kind: SessionKind, key: &str) -> Option<&mut Session> {
        self.sessions.get_mut(&kind)?.get_mut(key)
    }

    /// Store a session under the given account key, replacing any session of the
    /// same kind and key.
    pub fn put(&mut self, key: impl Into<String>, session: Session) {
        self.sessions.entry(session.kind())
            .or_default()
            .insert(key.into(), session);
    }

    pub fn remove(&mut self, kind: SessionKind, key: &str) -> Option<Session> {
        self.sessions.get_mut(&kind)?.shift_remove(key)
    }

    /// Iterate over every stored session with its account key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Session)> + '_ {
        self.sessions.values()
            .flat_map(|sessions| sessions.iter())
            .map(|(key, session)| (key.as_str(), session))
    }

}

fn read_database_file(file: &Path) -> Option<IndexMap<SessionKind, IndexMap<String, Session>>> {

    let document: Value = serde_json::from_reader(BufReader::new(File::open(file).ok()?)).ok()?;
    let document = document.as_object()?;

    let mut sessions = IndexMap::<SessionKind, IndexMap<String, Session>>::new();

    for (tag, tag_data) in document {

        // Unknown type tags are silently skipped.
        let Some(kind) = SessionKind::from_tag(tag) else {
            continue;
        };

        let records = tag_data.get("sessions")?.as_object()?;
        let map = sessions.entry(kind).or_default();

        for (key, record) in records {
            map.insert(key.clone(), Session::from_record(kind, record.as_object()?));
        }

    }

    Some(sessions)

}

/// Internal module for serde of the various authentication endpoints.
mod serde {

    /// (JSON) Successful authenticate/refresh response of the credential exchange.
    #[derive(Debug, Clone, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct YggdrasilSuccess {
        pub access_token: String,
        pub client_token: String,
        pub selected_profile: YggdrasilProfile,
    }

    #[derive(Debug, Clone, serde::Deserialize)]
    pub struct YggdrasilProfile {
        pub id: String,
        pub name: String,
    }

    /// (URL encoded) OAuth token endpoint request.
    #[derive(Debug, serde::Serialize)]
    #[serde(tag = "grant_type")]
    pub enum TokenRequest<'a> {
        #[serde(rename = "authorization_code")]
        AuthorizationCode {
            client_id: &'a str,
            redirect_uri: &'a str,
            code: &'a str,
            scope: &'a str,
        },
        #[serde(rename = "refresh_token")]
        RefreshToken {
            client_id: &'a str,
            redirect_uri: &'a str,
            refresh_token: &'a str,
            scope: &'a str,
        },
    }

    /// (JSON) OAuth token endpoint success.
    #[derive(Debug, Clone, serde::Deserialize)]
    pub struct TokenSuccess {
        pub access_token: String,
        pub refresh_token: String,
    }

    /// (JSON) OAuth token endpoint error.
    #[derive(Debug, Clone, serde::Deserialize)]
    pub struct TokenError {
        #[allow(unused)]
        pub error: String,
        pub error_description: String,
    }

    /// (JSON) XBL and XSTS authentication success.
    #[derive(Debug, Clone, serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct XblSuccess {
        pub token: String,
        pub display_claims: XblDisplayClaims,
    }

    #[derive(Debug, Clone, serde::Deserialize)]
    pub struct XblDisplayClaims {
        pub xui: Vec<XblXui>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
    pub struct XblXui {
        pub uhs: String,
    }

    /// (JSON) Game service authentication success.
    #[derive(Debug, Clone, serde::Deserialize)]
    pub struct McAuthSuccess {
        pub access_token: String,
    }

    /// (JSON) Game profile.
    #[derive(Debug, Clone, serde::Deserialize)]
    pub struct McProfile {
        pub id: String,
        pub name: String,
    }

    /// (JWT payload) Claims checked on the OpenID id_token.
    #[derive(Debug, Clone, serde::Deserialize)]
    pub struct OpenIdClaims {
        pub nonce: Option<String>,
        pub email: Option<String>,
    }

}

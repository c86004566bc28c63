use url::Url;

/// Token endpoint details from a registry's `WWW-Authenticate` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeContext {
    /// URL of the token-issuing endpoint
    pub realm: Url,
    pub service: String,
    pub scope: String,
}

impl ChallengeContext {
    pub fn new(realm: Url, service: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            realm,
            service: service.into(),
            scope: scope.into(),
        }
    }

    /// Parse a `Bearer` challenge such as
    /// `Bearer realm="https://auth.example.com/token",service="registry",scope="repository:app:pull"`
    ///
    /// Returns `None` for other schemes or when the realm is missing or not a URL.
    /// Missing `service` or `scope` parameters parse as empty strings.
    pub fn from_www_authenticate(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = String::new();
        let mut scope = String::new();

        for (key, value) in parse_auth_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = value,
                "scope" => scope = value,
                _ => {}
            }
        }

        let realm = Url::parse(&realm?).ok()?;
        Some(Self::new(realm, service, scope))
    }
}

/// Split `key="value", key2=token` pairs, honouring commas inside quoted values
fn parse_auth_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            break;
        }

        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        params.push((key, value));
    }

    params
}

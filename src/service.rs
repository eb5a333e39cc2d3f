use crate::json_tools::{self, optional_string_from_object, strings_from_object};
use onlyerror::Error;
use serde_json::{Value, json};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Missing or empty 'type' attribute
    MissingTypeAttribute,

    /// Missing or empty 'serviceEndpoint' attribute
    MissingServiceEndpointAttribute,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Service {
    id: Option<String>,
    ty: Vec<String>,
    endpoint: Vec<String>,
}

impl Service {
    pub fn new<T, E, S>(id: Option<String>, ty: T, endpoint: E) -> Result<Self, Error>
    where
        T: IntoIterator<Item = S>,
        E: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ty: Vec<_> = ty.into_iter().map(|s| s.as_ref().to_string()).collect();
        if ty.is_empty() {
            return Err(Error::MissingTypeAttribute);
        }

        let endpoint: Vec<_> = endpoint
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        if endpoint.is_empty() {
            return Err(Error::MissingServiceEndpointAttribute);
        }

        Ok(Self { id, ty, endpoint })
    }

    /// Parse a `service` entry. `type` and `serviceEndpoint` may be a string or an array.
    pub fn from_json(value: &Value) -> Result<Self, json_tools::Error> {
        let id = optional_string_from_object(value, "id")?.map(ToString::to_string);
        let ty = strings_from_object(value, "type")?;
        let endpoint = strings_from_object(value, "serviceEndpoint")?;

        Ok(Self::new(id, ty, endpoint)?)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn types(&self) -> &[String] {
        &self.ty
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoint
    }

    /// The first endpoint. Beacons carry exactly one.
    pub fn endpoint(&self) -> &str {
        &self.endpoint[0]
    }

    pub fn has_type(&self, ty: &str) -> bool {
        self.ty.iter().any(|t| t == ty)
    }

    pub fn to_json(&self) -> Value {
        let one_or_many = |values: &[String]| match values {
            [single] => json!(single),
            many => json!(many),
        };

        let mut value = json!({
            "type": one_or_many(&self.ty),
            "serviceEndpoint": one_or_many(&self.endpoint),
        });
        if let Some(id) = &self.id {
            value["id"] = json!(id);
        }

        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let service = Service::new(
            None,
            ["SingletonBeacon"],
            ["bitcoin:mh8h6FXkMzHaW4RKerGT33ZLqx52xL28dU"],
        );
        assert!(service.is_ok());
    }

    #[test]
    fn test_missing_type() {
        let service = Service::new(None, [], ["bitcoin:mh8h6FXkMzHaW4RKerGT33ZLqx52xL28dU"]);
        assert_eq!(service.unwrap_err(), Error::MissingTypeAttribute);
    }

    #[test]
    fn test_missing_service_endpoint() {
        let service = Service::new(None, ["SingletonBeacon"], []);
        assert_eq!(service.unwrap_err(), Error::MissingServiceEndpointAttribute);
    }

    #[test]
    fn test_json_round_trip() {
        let value = json!({
            "id": "#initialP2PKH",
            "type": "SingletonBeacon",
            "serviceEndpoint": "bitcoin:mh8h6FXkMzHaW4RKerGT33ZLqx52xL28dU",
        });

        let service = Service::from_json(&value).unwrap();
        assert_eq!(service.id(), Some("#initialP2PKH"));
        assert!(service.has_type("SingletonBeacon"));
        assert_eq!(service.endpoint(), "bitcoin:mh8h6FXkMzHaW4RKerGT33ZLqx52xL28dU");
        assert_eq!(service.to_json(), value);
    }

    #[test]
    fn test_from_json_empty_type() {
        let value = json!({"type": [], "serviceEndpoint": "bitcoin:x"});
        assert!(matches!(
            Service::from_json(&value),
            Err(json_tools::Error::Service(Error::MissingTypeAttribute))
        ));
    }
}

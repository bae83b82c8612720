//! AWS Signature Version 4 signing for Bedrock runtime calls

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "bedrock";

/// Signs bedrock-runtime requests with the account's static credentials
#[derive(Debug, Clone)]
pub(crate) struct SigV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
}

impl SigV4Signer {
    pub fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
        }
    }

    /// Produce the full header set for a signed POST, including
    /// `Authorization`, `host` and `x-amz-date`.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        body: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, String> {
        let parsed = url::Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
        let host = parsed.host_str().ok_or("missing host in URL")?;
        let path = parsed.path();
        let query = parsed.query().unwrap_or("");

        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = timestamp.format("%Y%m%d").to_string();

        // BTreeMap keeps headers in the sorted order SigV4 requires
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        headers.insert("host".into(), host.to_string());
        headers.insert("x-amz-date".into(), amz_date.clone());

        let canonical_headers = headers
            .iter()
            .map(|(k, v)| format!("{k}:{}", v.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));
        let canonical_request = format!(
            "{}\n{path}\n{query}\n{canonical_headers}\n\n{signed_headers}\n{payload_hash}",
            method.to_uppercase()
        );

        let credential_scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", self.region);
        let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!("{ALGORITHM}\n{amz_date}\n{credential_scope}\n{request_hash}");

        let signature = self.signature(&string_to_sign, &date_stamp)?;
        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        );
        headers.insert("Authorization".into(), authorization);

        Ok(headers.into_iter().collect())
    }

    fn signature(&self, string_to_sign: &str, date_stamp: &str) -> Result<String, String> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_key).as_bytes(),
            date_stamp.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes())?;
        Ok(hex::encode(signature))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| format!("HMAC key error: {e}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn hmac_matches_known_vector() {
        let digest = hmac_sha256(b"key", b"message").unwrap();
        assert_eq!(
            hex::encode(digest),
            "6e9ef29b75fffc5b7abae527d58fdadb2fe42e7219011e917a9c6e0c3d5e4c3b"
        );
    }

    #[test]
    fn signing_yields_authorization_and_date_headers() {
        let signer = SigV4Signer::new(
            "AKIATEST".into(),
            "testsecret".into(),
            "us-east-1".into(),
        );
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let headers = signer
            .sign(
                "POST",
                "https://bedrock-runtime.us-east-1.amazonaws.com/model/test/converse",
                "{}",
                timestamp,
            )
            .unwrap();

        let auth = headers
            .iter()
            .find(|(k, _)| k == "Authorization")
            .map(|(_, v)| v.as_str())
            .unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIATEST/20240101/us-east-1/bedrock/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-date"));
        assert!(headers.iter().any(|(k, v)| k == "x-amz-date" && v == "20240101T120000Z"));
    }

    #[test]
    fn signature_is_deterministic() {
        let signer = SigV4Signer::new("A".into(), "B".into(), "eu-west-1".into());
        let timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let url = "https://bedrock-runtime.eu-west-1.amazonaws.com/model/m/converse";
        let first = signer.sign("POST", url, "{\"a\":1}", timestamp).unwrap();
        let second = signer.sign("POST", url, "{\"a\":1}", timestamp).unwrap();
        assert_eq!(first, second);
    }
}

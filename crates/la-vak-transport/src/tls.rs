use std::sync::Arc;
use std::time::Duration;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};

use crate::error::TransportError;

/// How long the ephemeral identity certificate is valid for. Nodes
/// regenerate one on every start; nothing depends on it outliving a
/// single run — TLS exists here to get channel confidentiality for free,
/// not to authenticate peers.
const CERT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// A freshly minted self-signed identity: DER cert + matching private key,
/// ready to feed into a rustls `ServerConfig`.
pub struct Identity {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

/// Generates a 24h self-signed certificate for `subject` (the local
/// hostname). La-Vak has no certificate authority and no peer identity
/// database; the cert exists only to stand up a TLS channel, which is why
/// it is regenerated per process rather than persisted.
pub fn generate_identity(subject: &str) -> Result<Identity, TransportError> {
    let mut params = CertificateParams::new(vec![subject.to_string()])
        .map_err(|e| TransportError::Tls(format!("cert params: {e}")))?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, subject);
    params.distinguished_name = name;
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::minutes(5);
    params.not_after = now + time::Duration::seconds(CERT_VALIDITY.as_secs() as i64);

    let key_pair = KeyPair::generate().map_err(|e| TransportError::Tls(format!("keypair: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| TransportError::Tls(format!("self-sign: {e}")))?;

    Ok(Identity {
        cert: cert.der().clone(),
        key: PrivateKeyDer::Pkcs8(key_pair.serialize_der().into()),
    })
}

/// No peer identity database exists, so there is nothing to verify a
/// certificate against. Discovery over multicast already scopes the
/// protocol to the LAN segment; this verifier only keeps the TLS
/// handshake from refusing to proceed against a cert chain it has never
/// seen before. Accepting any presented certificate is the deliberate
/// behavior, not an oversight.
#[derive(Debug)]
struct AcceptAny;

impl ServerCertVerifier for AcceptAny {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

/// Builds a server config that presents `identity` and never asks the
/// client for one — La-Vak authenticates transfers at the application
/// layer (handshake + accept/reject), not at the TLS layer.
pub fn server_config(identity: &Identity) -> Result<Arc<ServerConfig>, TransportError> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![identity.cert.clone()], identity.key.clone_key())
        .map_err(|e| TransportError::Tls(format!("server config: {e}")))?;
    Ok(Arc::new(config))
}

/// Builds a client config that accepts whatever certificate the peer
/// presents (see [`AcceptAny`]).
pub fn client_config() -> Arc<ClientConfig> {
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAny))
        .with_no_client_auth();
    Arc::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_a_cert_valid_for_roughly_one_day() {
        let identity = generate_identity("test-host").unwrap();
        assert!(!identity.cert.as_ref().is_empty());
    }

    #[test]
    fn server_and_client_configs_build_without_error() {
        let identity = generate_identity("test-host").unwrap();
        server_config(&identity).unwrap();
        client_config();
    }
}

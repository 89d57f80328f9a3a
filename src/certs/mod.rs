// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! cert-manager objects backing the hub's mTLS endpoint.
//!
//! A self-signed issuer bootstraps a CA certificate, a CA issuer bound to the
//! generated CA secret then signs the server and client leaf certificates.

use kube::api::Api;
use kube::{Client, ResourceExt};
use tracing::{info, instrument};

use crate::constants::certs;
use crate::deploy::{self, ApplyOutcome};
use crate::error::Result;
use crate::kubernetes::delete_if_exists;
use crate::manifest::equality::merge_metadata;
use crate::manifest::Reconcilable;
use crate::types::certmanager::{
    CaIssuer, CertificateSpec, IssuerRef, IssuerSpec, SelfSignedIssuer,
};
use crate::types::{Certificate, Issuer};

impl Reconcilable for Issuer {
    fn matches(&self, live: &Self) -> bool {
        self.spec.self_signed.is_some() == live.spec.self_signed.is_some()
            && self.spec.ca.as_ref().map(|c| &c.secret_name)
                == live.spec.ca.as_ref().map(|c| &c.secret_name)
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated.spec = self.spec.clone();
        updated
    }
}

impl Reconcilable for Certificate {
    fn matches(&self, live: &Self) -> bool {
        self.spec.secret_name == live.spec.secret_name
            && self.spec.common_name == live.spec.common_name
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated.spec = self.spec.clone();
        updated
    }
}

fn issuer(name: &str, namespace: &str, spec: IssuerSpec) -> Issuer {
    let mut issuer = Issuer::new(name, spec);
    issuer.metadata.namespace = Some(namespace.to_string());
    issuer
}

fn certificate(name: &str, namespace: &str, spec: CertificateSpec) -> Certificate {
    let mut cert = Certificate::new(name, spec);
    cert.metadata.namespace = Some(namespace.to_string());
    cert
}

fn issued_by(issuer: &str) -> IssuerRef {
    IssuerRef {
        name: issuer.to_string(),
        kind: Some("Issuer".to_string()),
        group: Some("cert-manager.io".to_string()),
    }
}

/// Issuers and certificates in creation order
pub fn desired(namespace: &str, server_dns_names: Vec<String>) -> (Vec<Issuer>, Vec<Certificate>) {
    let selfsign = issuer(
        certs::SELFSIGN_ISSUER,
        namespace,
        IssuerSpec {
            self_signed: Some(SelfSignedIssuer {}),
            ca: None,
        },
    );
    let ca_issuer = issuer(
        certs::CA_ISSUER,
        namespace,
        IssuerSpec {
            self_signed: None,
            ca: Some(CaIssuer {
                secret_name: certs::CA_SECRET.to_string(),
            }),
        },
    );

    let ca = certificate(
        certs::CA_CERTIFICATE,
        namespace,
        CertificateSpec {
            secret_name: certs::CA_SECRET.to_string(),
            common_name: Some(certs::CA_CERTIFICATE.to_string()),
            is_ca: Some(true),
            issuer_ref: issued_by(certs::SELFSIGN_ISSUER),
            ..Default::default()
        },
    );
    let server = certificate(
        certs::SERVER_CERTIFICATE,
        namespace,
        CertificateSpec {
            secret_name: certs::SERVER_SECRET.to_string(),
            common_name: Some(certs::SERVER_CERTIFICATE.to_string()),
            dns_names: Some(server_dns_names),
            usages: Some(vec!["server auth".to_string()]),
            issuer_ref: issued_by(certs::CA_ISSUER),
            ..Default::default()
        },
    );
    let client = certificate(
        certs::CLIENT_CERTIFICATE,
        namespace,
        CertificateSpec {
            secret_name: certs::CLIENT_SECRET.to_string(),
            common_name: Some(certs::CLIENT_CERTIFICATE.to_string()),
            usages: Some(vec!["client auth".to_string()]),
            issuer_ref: issued_by(certs::CA_ISSUER),
            ..Default::default()
        },
    );

    (vec![selfsign, ca_issuer], vec![ca, server, client])
}

/// Create or update the issuer chain and leaf certificates
#[instrument(skip(client, server_dns_names))]
pub async fn ensure(client: &Client, namespace: &str, server_dns_names: Vec<String>) -> Result<()> {
    let (issuers, certificates) = desired(namespace, server_dns_names);
    let issuer_api: Api<Issuer> = Api::namespaced(client.clone(), namespace);
    let cert_api: Api<Certificate> = Api::namespaced(client.clone(), namespace);

    // the CA certificate must exist before the CA issuer refers to its secret
    let (selfsign, ca_issuer) = (&issuers[0], &issuers[1]);
    let mut outcomes = vec![deploy::apply(&issuer_api, selfsign).await?];
    outcomes.push(deploy::apply(&cert_api, &certificates[0]).await?);
    outcomes.push(deploy::apply(&issuer_api, ca_issuer).await?);
    for cert in &certificates[1..] {
        outcomes.push(deploy::apply(&cert_api, cert).await?);
    }

    let written = outcomes.iter().filter(|o| **o != ApplyOutcome::Unchanged).count();
    if written > 0 {
        info!("Wrote {} certificate objects in {}", written, namespace);
    }
    Ok(())
}

/// Delete every certificate and issuer `ensure` manages
#[instrument(skip(client))]
pub async fn cleanup(client: &Client, namespace: &str) -> Result<()> {
    let (issuers, certificates) = desired(namespace, Vec::new());
    let issuer_api: Api<Issuer> = Api::namespaced(client.clone(), namespace);
    let cert_api: Api<Certificate> = Api::namespaced(client.clone(), namespace);

    for cert in certificates.iter().rev() {
        delete_if_exists(&cert_api, &cert.name_any()).await?;
    }
    for issuer in issuers.iter().rev() {
        delete_if_exists(&issuer_api, &issuer.name_any()).await?;
    }
    Ok(())
}

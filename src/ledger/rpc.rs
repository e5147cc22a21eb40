//! JSON-RPC 2.0 ledger backend.
//!
//! Reads go straight to the cluster (`getBalance`, `getAccountInfo`).
//! Mutations are compiled into a legacy transaction signed by the session
//! identity, sent base64-encoded with `sendTransaction`, then polled with
//! `getSignatureStatuses` until they reach the configured commitment.
//! No retries: a failed call is returned as-is.

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use solana_sdk::{hash::Hash, instruction::Instruction, message::Message, pubkey::Pubkey, transaction::Transaction};
use tracing::{debug, error, info, trace};

use crate::{
    keys::Credential,
    project::{Criteria, ProjectHandle, ProjectSpec},
};

use super::{LedgerError, program};

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct RpcLedger {
    client: Client,
    endpoint: String,
    program_id: Pubkey,
    commitment: String,
    confirm_timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl RpcLedger {
    pub fn new(
        endpoint: String,
        program_id: Pubkey,
        commitment: String,
        timeout_seconds: u64,
        confirm_timeout_seconds: u64,
    ) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            program_id,
            commitment,
            confirm_timeout: Duration::from_secs(confirm_timeout_seconds),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        let res: WithContext<u64> = self
            .call("getBalance", json!([address.to_string(), { "commitment": self.commitment }]))
            .await?;
        Ok(res.value)
    }

    pub async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        let res: WithContext<Option<Value>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), { "encoding": "base64", "commitment": self.commitment }]),
            )
            .await?;
        Ok(res.value.is_some())
    }

    pub async fn create_project(
        &self,
        authority: &Credential,
        spec: &ProjectSpec,
    ) -> Result<ProjectHandle, LedgerError> {
        let signer = authority.pubkey();
        let handle = program::project_handle(&self.program_id, &signer, spec.name())
            .ok_or_else(|| LedgerError::Encode("no off-curve project address".into()))?;

        if self.account_exists(&handle.address).await? {
            return Err(LedgerError::AlreadyExists(handle.address));
        }

        let ix = program::create_project(&self.program_id, &handle, &signer, &signer, spec)?;
        self.submit(authority, &[ix]).await?;
        Ok(handle)
    }

    pub async fn change_driver(
        &self,
        authority: &Credential,
        project: &ProjectHandle,
        driver: &Pubkey,
    ) -> Result<(), LedgerError> {
        let signer = authority.pubkey();
        let ix = program::change_driver(&self.program_id, project, driver, &signer, &signer)?;
        self.submit(authority, &[ix]).await.map(|_| ())
    }

    pub async fn add_criteria(
        &self,
        authority: &Credential,
        project: &ProjectHandle,
        criteria: &Criteria,
    ) -> Result<(), LedgerError> {
        let signer = authority.pubkey();
        let ix = program::add_criteria(&self.program_id, project, criteria, &signer, &signer)?;
        self.submit(authority, &[ix]).await.map(|_| ())
    }

    /// Sign, send and confirm. Returns the transaction signature.
    async fn submit(&self, payer: &Credential, instructions: &[Instruction]) -> Result<String, LedgerError> {
        let blockhash: WithContext<LatestBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": self.commitment }]))
            .await?;
        let recent = Hash::from_str(&blockhash.value.blockhash)
            .map_err(|e| LedgerError::Decode(format!("bad blockhash '{}': {e}", blockhash.value.blockhash)))?;

        let message = Message::new_with_blockhash(instructions, Some(&payer.pubkey()), &recent);
        let mut tx = Transaction::new_unsigned(message);
        tx.try_sign(&[payer], recent).map_err(|e| LedgerError::Encode(format!("signing: {e}")))?;
        let wire = bincode::serialize(&tx).map_err(|e| LedgerError::Encode(format!("transaction: {e}")))?;
        let encoded = STANDARD.encode(wire);

        let signature: String = self
            .call(
                "sendTransaction",
                json!([encoded, { "encoding": "base64", "preflightCommitment": self.commitment }]),
            )
            .await?;
        debug!(%signature, local_id = %tx.signatures[0], "transaction sent");

        self.confirm(&signature).await?;
        info!(%signature, commitment = %self.commitment, "transaction confirmed");
        Ok(signature)
    }

    async fn confirm(&self, signature: &str) -> Result<(), LedgerError> {
        let wanted = commitment_rank(&self.commitment);
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;

        loop {
            let res: WithContext<Vec<Option<SignatureStatus>>> = self
                .call("getSignatureStatuses", json!([[signature]]))
                .await?;

            if let Some(Some(status)) = res.value.into_iter().next() {
                if let Some(err) = status.err {
                    return Err(LedgerError::Rejected {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    });
                }
                if status.confirmation_status.as_deref().map(commitment_rank) >= Some(wanted) {
                    return Ok(());
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::Unconfirmed(signature.to_string()));
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        trace!(%method, id, params = %body["params"], "rpc request");

        let response = self.client.post(&self.endpoint).json(&body).send().await.map_err(|e| {
            error!(endpoint = %self.endpoint, %method, error = %e, "rpc transport failure");
            LedgerError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!("HTTP {status}: {text}")));
        }

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{method}: {e}")))?;

        match envelope {
            RpcResponse { error: Some(err), .. } => {
                debug!(%method, code = err.code, message = %err.message, "rpc error");
                Err(LedgerError::Rpc { code: err.code, message: err.message })
            }
            RpcResponse { result: Some(result), .. } => Ok(result),
            RpcResponse { .. } => Err(LedgerError::Decode(format!("{method}: empty response"))),
        }
    }
}

/// `processed` < `confirmed` < `finalized`; unknown levels rank as `processed`.
fn commitment_rank(level: &str) -> u8 {
    match level {
        "finalized" => 2,
        "confirmed" => 1,
        _ => 0,
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct LatestBlockhash {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::default_profile_data_configs;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BLOCKHASH: &str = "11111111111111111111111111111111";

    fn ledger(server: &MockServer) -> RpcLedger {
        RpcLedger::new(
            server.uri(),
            crate::config::HIVE_CONTROL_PROGRAM_ID,
            "processed".into(),
            5,
            2,
        )
        .unwrap()
    }

    async fn mock_blockhash_and_send(server: &MockServer) {
        mock_result(server, "getLatestBlockhash", json!({
            "context": { "slot": 1 },
            "value": { "blockhash": BLOCKHASH, "lastValidBlockHeight": 10 }
        }))
        .await;
        mock_result(server, "sendTransaction", json!("5sig")).await;
    }

    async fn mock_confirmed(server: &MockServer) {
        mock_result(server, "getSignatureStatuses", json!({
            "context": { "slot": 2 },
            "value": [{ "slot": 2, "confirmations": 0, "err": null, "confirmationStatus": "confirmed" }]
        }))
        .await;
    }

    /// The transaction carried by the single `sendTransaction` request.
    async fn sent_transaction(server: &MockServer) -> Transaction {
        let requests = server.received_requests().await.unwrap();
        let send = requests
            .iter()
            .map(|r| r.body_json::<Value>().unwrap())
            .find(|body| body["method"] == "sendTransaction")
            .unwrap();
        let wire = STANDARD.decode(send["params"][0].as_str().unwrap()).unwrap();
        bincode::deserialize(&wire).unwrap()
    }

    async fn mock_result(server: &MockServer, rpc_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": result
            })))
            .mount(server)
            .await;
    }

    fn spec() -> ProjectSpec {
        ProjectSpec::new("SolPatrol", 2, default_profile_data_configs()).unwrap()
    }

    #[tokio::test]
    async fn balance_reads_context_value() {
        let server = MockServer::start().await;
        mock_result(&server, "getBalance", json!({ "context": { "slot": 1 }, "value": 150_000_000u64 })).await;
        let balance = ledger(&server).balance(&Pubkey::new_unique()).await.unwrap();
        assert_eq!(balance, 150_000_000);
    }

    #[tokio::test]
    async fn rpc_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": { "code": -32602, "message": "Invalid param" }
            })))
            .mount(&server)
            .await;
        let err = ledger(&server).balance(&Pubkey::new_unique()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { code: -32602, .. }));
    }

    #[tokio::test]
    async fn http_failure_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = ledger(&server).balance(&Pubkey::new_unique()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)));
    }

    #[tokio::test]
    async fn existing_project_account_is_not_recreated() {
        let server = MockServer::start().await;
        mock_result(
            &server,
            "getAccountInfo",
            json!({ "context": { "slot": 1 }, "value": { "lamports": 1, "data": ["", "base64"] } }),
        )
        .await;
        let err = ledger(&server).create_project(&Credential::generate(), &spec()).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(_)));

        let sent = server.received_requests().await.unwrap();
        assert!(sent.iter().all(|r| !String::from_utf8_lossy(&r.body).contains("sendTransaction")));
    }

    #[tokio::test]
    async fn create_project_sends_and_confirms() {
        let server = MockServer::start().await;
        mock_result(&server, "getAccountInfo", json!({ "context": { "slot": 1 }, "value": null })).await;
        mock_result(&server, "getLatestBlockhash", json!({
            "context": { "slot": 1 },
            "value": { "blockhash": BLOCKHASH, "lastValidBlockHeight": 10 }
        }))
        .await;
        mock_result(&server, "sendTransaction", json!("5sig")).await;
        mock_result(&server, "getSignatureStatuses", json!({
            "context": { "slot": 2 },
            "value": [{ "slot": 2, "confirmations": 0, "err": null, "confirmationStatus": "confirmed" }]
        }))
        .await;

        let authority = Credential::generate();
        let rpc = ledger(&server);
        let handle = rpc.create_project(&authority, &spec()).await.unwrap();
        let expected = program::project_handle(&rpc.program_id, &authority.pubkey(), "SolPatrol").unwrap();
        assert_eq!(handle, expected);
    }

    #[tokio::test]
    async fn failed_transaction_is_rejected() {
        let server = MockServer::start().await;
        mock_result(&server, "getLatestBlockhash", json!({
            "context": { "slot": 1 },
            "value": { "blockhash": BLOCKHASH, "lastValidBlockHeight": 10 }
        }))
        .await;
        mock_result(&server, "sendTransaction", json!("5sig")).await;
        mock_result(&server, "getSignatureStatuses", json!({
            "context": { "slot": 2 },
            "value": [{ "err": { "InstructionError": [0, "Custom"] }, "confirmationStatus": "processed" }]
        }))
        .await;

        let authority = Credential::generate();
        let handle = program::project_handle(&ledger(&server).program_id, &authority.pubkey(), "p").unwrap();
        let err = ledger(&server)
            .change_driver(&authority, &handle, &Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { .. }));
    }

    #[tokio::test]
    async fn change_driver_sends_signed_instruction() {
        let server = MockServer::start().await;
        mock_blockhash_and_send(&server).await;
        mock_confirmed(&server).await;

        let authority = Credential::generate();
        let rpc = ledger(&server);
        let handle = program::project_handle(&rpc.program_id, &authority.pubkey(), "SolPatrol").unwrap();
        let driver = Pubkey::new_unique();
        rpc.change_driver(&authority, &handle, &driver).await.unwrap();

        let tx = sent_transaction(&server).await;
        assert!(tx.verify().is_ok());
        assert_eq!(tx.message.account_keys[0], authority.pubkey());
        assert!(tx.message.account_keys.contains(&driver));
        let ix = &tx.message.instructions[0];
        assert_eq!(tx.message.account_keys[usize::from(ix.program_id_index)], rpc.program_id);
        assert_eq!(ix.data, program::discriminator("change_driver").to_vec());
    }

    #[tokio::test]
    async fn add_criteria_sends_collection() {
        let server = MockServer::start().await;
        mock_blockhash_and_send(&server).await;
        mock_confirmed(&server).await;

        let authority = Credential::generate();
        let rpc = ledger(&server);
        let handle = program::project_handle(&rpc.program_id, &authority.pubkey(), "SolPatrol").unwrap();
        let collection = Pubkey::new_unique();
        rpc.add_criteria(&authority, &handle, &Criteria { collection }).await.unwrap();

        let tx = sent_transaction(&server).await;
        assert!(tx.verify().is_ok());
        let ix = &tx.message.instructions[0];
        assert_eq!(&ix.data[..8], &program::discriminator("add_criteria"));
        assert_eq!(&ix.data[9..], collection.as_ref());
    }

    #[tokio::test]
    async fn unseen_signature_times_out_unconfirmed() {
        let server = MockServer::start().await;
        mock_blockhash_and_send(&server).await;
        mock_result(&server, "getSignatureStatuses", json!({ "context": { "slot": 2 }, "value": [null] })).await;

        let rpc = RpcLedger::new(server.uri(), crate::config::HIVE_CONTROL_PROGRAM_ID, "confirmed".into(), 5, 0)
            .unwrap();
        let authority = Credential::generate();
        let handle = program::project_handle(&rpc.program_id, &authority.pubkey(), "p").unwrap();
        let err = rpc
            .add_criteria(&authority, &handle, &Criteria { collection: Pubkey::new_unique() })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unconfirmed(ref sig) if sig == "5sig"));
    }

    #[test]
    fn commitment_ordering() {
        assert!(commitment_rank("finalized") > commitment_rank("confirmed"));
        assert!(commitment_rank("confirmed") > commitment_rank("processed"));
    }
}

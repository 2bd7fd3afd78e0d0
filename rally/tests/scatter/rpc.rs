use rally::rpc::rpc_handler;
use rally::{Locality, RallyError};

const REVERSE: u16 = 100;
const REJECT: u16 = 101;
const MISSING: u16 = 102;

#[tokio::test]
async fn test_invoke_runs_handler_on_target() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    localities[1]
        .register_action(
            REVERSE,
            rpc_handler(|request: Vec<u8>| async move { Ok(request.into_iter().rev().collect()) }),
        )
        .await;

    let before = localities[0].dispatch_count();
    let reply = localities[0]
        .invoke(1, REVERSE, vec![1, 2, 3])
        .await
        .unwrap();
    assert_eq!(reply, vec![3, 2, 1]);
    assert_eq!(localities[0].dispatch_count(), before + 1);
}

#[tokio::test]
async fn test_unregistered_action_is_a_remote_fault() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    let err = localities[0]
        .invoke(1, MISSING, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::Remote { site: 1, .. }), "{err}");
    assert!(err.to_string().contains("102"), "{err}");
}

#[tokio::test]
async fn test_handler_argument_fault_comes_back_as_protocol_fault() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    localities[1]
        .register_action(
            REJECT,
            rpc_handler(|_request: Vec<u8>| async move {
                Err::<Vec<u8>, _>(RallyError::InvalidArity { arity: 0 })
            }),
        )
        .await;

    let err = localities[0]
        .invoke(1, REJECT, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::RemoteProtocol { site: 1, .. }), "{err}");
    assert!(err.is_protocol_fault());
}

#[tokio::test]
async fn test_local_invoke_skips_the_network() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    localities[0]
        .register_action(
            REVERSE,
            rpc_handler(|request: Vec<u8>| async move { Ok(request.into_iter().rev().collect()) }),
        )
        .await;
    let reply = localities[0].invoke(0, REVERSE, b"ab".to_vec()).await.unwrap();
    assert_eq!(reply, b"ba".to_vec());
    assert_eq!(localities[0].inflight_requests(), 0);
}

use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use livepreview::middleware::{Flow, RequestContext};
use livepreview::{
    from_fn, IncomingRequest, Middleware, MiddlewareChain, MiddlewareError, Next,
    ResponseAccumulator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts requests and refuses paths below `/private/`.
struct Gatekeeper {
    seen: AtomicUsize,
}

impl Middleware for Gatekeeper {
    fn handle(
        &self,
        req: &IncomingRequest,
        res: &mut ResponseAccumulator,
        next: &mut Next,
    ) -> anyhow::Result<()> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if req.path.starts_with("/private/") {
            res.write_head(
                StatusCode::FORBIDDEN,
                [(CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
            );
            res.end_with("forbidden");
        } else {
            next.proceed();
        }
        Ok(())
    }
}

fn chain_with(gate: &Arc<Gatekeeper>) -> MiddlewareChain {
    let tail = from_fn(|_, res, next| {
        res.try_set_header("X-Chain", "tail")?;
        next.proceed();
        Ok(())
    });
    let gate: Arc<dyn Middleware> = Arc::clone(gate) as Arc<dyn Middleware>;
    MiddlewareChain::from(vec![gate, tail])
}

#[test]
fn test_struct_middleware_ends_request() {
    let gate = Arc::new(Gatekeeper {
        seen: AtomicUsize::new(0),
    });
    let chain = chain_with(&gate);
    let mut ctx = RequestContext::new(IncomingRequest::new(Method::GET, "/private/notes.html"));

    assert_eq!(chain.run(&mut ctx).unwrap(), Flow::Ended { index: 0 });
    assert_eq!(ctx.response.status(), StatusCode::FORBIDDEN);
    assert_eq!(ctx.response.body_text(), "forbidden");
    assert!(ctx.response.header("x-chain").is_none());
    assert_eq!(gate.seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_chain_is_shared_across_requests() {
    let gate = Arc::new(Gatekeeper {
        seen: AtomicUsize::new(0),
    });
    let chain = chain_with(&gate);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let chain = chain.clone();
            std::thread::spawn(move || {
                let mut ctx =
                    RequestContext::new(IncomingRequest::new(Method::GET, format!("/page{i}.html")));
                let flow = chain.run(&mut ctx).unwrap();
                (flow, ctx.response.header("x-chain").cloned())
            })
        })
        .collect();
    for handle in handles {
        let (flow, header) = handle.join().unwrap();
        assert_eq!(flow, Flow::Fallthrough);
        assert_eq!(header.unwrap(), "tail");
    }
    assert_eq!(gate.seen.load(Ordering::SeqCst), 8);
}

#[test]
fn test_invalid_header_from_middleware_is_failure() {
    let bad = from_fn(|_, res, next| {
        res.try_set_header("bad header", "x")?;
        next.proceed();
        Ok(())
    });
    let chain = MiddlewareChain::from(vec![bad]);
    let mut ctx = RequestContext::new(IncomingRequest::new(Method::GET, "/"));
    let err = chain.run(&mut ctx).unwrap_err();
    assert!(matches!(err, MiddlewareError::Failed { index: 0, .. }));
    assert!(err.to_string().contains("middleware #0"));
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

use edge_provision::{MemoryCloud, ProvisionError};
use edge_provision::core::{Page, PagedLister};
use edge_provision::issuance::Certificate;
use edge_provision::providers::CertificateApi;

#[tokio::test]
async fn paging_collects_three_pages_in_three_fetches() -> Result<()> {
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = fetches.clone();

    let items = PagedLister::new("number", move |cursor: Option<usize>| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let page = cursor.unwrap_or(0);
            let items: Vec<usize> = (page * 50..(page + 1) * 50).collect();
            // The third page carries no continuation.
            Ok::<_, ProvisionError>(Page::from_truncated(items, page < 2, Some(page + 1)))
        }
    })
    .collect_all()
    .await?;

    assert_eq!(items.len(), 150);
    assert_eq!(items.first(), Some(&0));
    assert_eq!(items.last(), Some(&149));
    assert_eq!(fetches.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn paging_follows_provider_cursors() -> Result<()> {
    let cloud = Arc::new(MemoryCloud::new().with_page_size(50));
    for n in 0..150 {
        cloud
            .request_certificate(&format!("site-{n}.example.com"), &[])
            .await?;
    }

    let certificates = Certificate::list(cloud.clone()).await?;

    assert_eq!(certificates.len(), 150);
    assert_eq!(cloud.calls("ListCertificates"), 3);
    Ok(())
}

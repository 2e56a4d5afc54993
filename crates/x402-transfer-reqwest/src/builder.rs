use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;
use x402_transfer_types::ledger::LedgerClient;

use crate::middleware::PaymentHandler;

/// Adds a [`PaymentHandler`] to a `reqwest` client or client builder.
pub trait ReqwestWithPayments<A, L> {
    fn with_payments(self, handler: PaymentHandler<L>) -> ReqwestWithPaymentsBuilder<A, L>;
}

impl<L> ReqwestWithPayments<Client, L> for Client {
    fn with_payments(self, handler: PaymentHandler<L>) -> ReqwestWithPaymentsBuilder<Client, L> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            handler,
        }
    }
}

impl<L> ReqwestWithPayments<ClientBuilder, L> for ClientBuilder {
    fn with_payments(
        self,
        handler: PaymentHandler<L>,
    ) -> ReqwestWithPaymentsBuilder<ClientBuilder, L> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            handler,
        }
    }
}

pub struct ReqwestWithPaymentsBuilder<A, L> {
    inner: A,
    handler: PaymentHandler<L>,
}

pub trait ReqwestWithPaymentsBuild {
    type BuildResult;
    type BuilderResult;

    fn build(self) -> Self::BuildResult;
    fn builder(self) -> Self::BuilderResult;
}

impl<L> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<Client, L>
where
    L: LedgerClient + 'static,
{
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(self.handler)
    }
}

impl<L> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<ClientBuilder, L>
where
    L: LedgerClient + 'static,
{
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        let builder = self.builder()?;
        Ok(builder.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.handler))
    }
}

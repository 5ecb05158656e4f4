mod charges;
mod checkout;
mod helpers;
mod mocks;
mod webhook;
